//! The frame-provider boundary.
//!
//! A frame bundles the per-image inputs the algorithms consume: the
//! background-subtracted image, an optional variance map with its validity
//! threshold, the thresholded label raster for neighbour tests, and the gain.
//! Frames are immutable snapshots; many measurements read them concurrently.

use crate::buffer::PixelBuffer;
use crate::error::{MeasureError, Result};

/// Read-only inputs for one image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Background-subtracted pixel values.
    pub image: PixelBuffer,
    /// Per-pixel variance; absent means uniform variance of 1 and every pixel
    /// valid.
    pub variance: Option<PixelBuffer>,
    /// A pixel is valid when its variance is strictly below this threshold.
    pub variance_threshold: f64,
    /// Thresholded detection raster (> 0 marks detected pixels); absent
    /// disables neighbour classification.
    pub labels: Option<PixelBuffer>,
    /// Detector gain for the Poisson term of the flux error; `<= 0` or
    /// non-finite disables that term.
    pub gain: f64,
}

impl Frame {
    /// A frame with only an image: no masking, no neighbour info, no Poisson
    /// error term.
    pub fn from_image(image: PixelBuffer) -> Self {
        Self {
            image,
            variance: None,
            variance_threshold: f64::INFINITY,
            labels: None,
            gain: 0.0,
        }
    }

    /// Validate that auxiliary rasters match the image dimensions.
    pub fn validate(&self) -> Result<()> {
        let expected = (self.image.width(), self.image.height());
        for aux in [self.variance.as_ref(), self.labels.as_ref()]
            .into_iter()
            .flatten()
        {
            let got = (aux.width(), aux.height());
            if got != expected {
                return Err(MeasureError::BufferShape { expected, got });
            }
        }
        Ok(())
    }

    /// Pixel validity under the variance threshold. Caller must have checked
    /// image bounds.
    #[inline]
    pub fn is_valid(&self, x: i64, y: i64) -> bool {
        match &self.variance {
            Some(v) => v.value(x, y) < self.variance_threshold,
            None => true,
        }
    }

    /// Variance contribution of a pixel; uniform 1 when no map is present.
    #[inline]
    pub fn pixel_variance(&self, x: i64, y: i64) -> f64 {
        match &self.variance {
            Some(v) => v.value(x, y),
            None => 1.0,
        }
    }
}
