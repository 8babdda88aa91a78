//! Diagnostic raster of measured aperture footprints.
//!
//! Aperture pixels are stamped with a per-source value so overlapping
//! apertures remain distinguishable. The raster is shared per frame and
//! callers must serialize `stamp` externally (the pipeline holds it behind a
//! mutex); writing is a pure side effect with no influence on measurements.

use std::path::Path;

use image::{GrayImage, Luma};

use crate::error::{MeasureError, Result};
use crate::neighbour::PixelCoord;

/// Accumulating check-image raster.
#[derive(Debug, Clone)]
pub struct CheckImage {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl CheckImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Stamp an aperture footprint with the given source value. Out-of-range
    /// pixels are ignored.
    pub fn stamp(&mut self, footprint: &[PixelCoord], value: f64) {
        for p in footprint {
            if p.x >= 0 && p.y >= 0 && (p.x as usize) < self.width && (p.y as usize) < self.height
            {
                self.data[p.y as usize * self.width + p.x as usize] = value;
            }
        }
    }

    /// Render to an 8-bit grayscale image, scaling the maximum stamp to 255.
    pub fn to_gray(&self) -> GrayImage {
        let max = self.data.iter().cloned().fold(0.0f64, f64::max);
        let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = (self.data[y * self.width + x] * scale).round().clamp(0.0, 255.0);
                img.put_pixel(x as u32, y as u32, Luma([v as u8]));
            }
        }
        img
    }

    /// Write the raster as a PNG.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_gray()
            .save(path)
            .map_err(|e| MeasureError::CheckImage(e.to_string()))
    }
}
