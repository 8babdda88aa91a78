//! Read-only pixel grid abstraction.
//!
//! All algorithms address pixels through `(width, height, value, in_bounds)`
//! instead of raw pointer arithmetic; coordinates are signed so that scans may
//! probe outside the image and detect it explicitly.

use image::GrayImage;

/// A 2-D grid of `f64` samples in row-major order.
///
/// Shared read-only across concurrent measurements; nothing in this crate
/// mutates a buffer after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Vec<f64>,
    width: usize,
    height: usize,
}

impl PixelBuffer {
    /// Wrap a row-major sample vector. Panics if `data.len() != width * height`.
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), width * height, "pixel data length mismatch");
        Self {
            data,
            width,
            height,
        }
    }

    /// A buffer filled with a constant value.
    pub fn constant(width: usize, height: usize, value: f64) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    /// Build a buffer by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, data)
    }

    /// Convert an 8-bit grayscale image to `f64` samples in `[0, 255]`.
    pub fn from_gray(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self::new(
            w as usize,
            h as usize,
            img.as_raw().iter().map(|&v| v as f64).collect(),
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether `(x, y)` addresses a pixel of this buffer.
    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Sample value at `(x, y)`. Caller must have checked [`Self::in_bounds`].
    #[inline]
    pub fn value(&self, x: i64, y: i64) -> f64 {
        debug_assert!(self.in_bounds(x, y));
        self.data[y as usize * self.width + x as usize]
    }

    /// Bounds-checked sample access.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<f64> {
        if self.in_bounds(x, y) {
            Some(self.value(x, y))
        } else {
            None
        }
    }

    /// Raw row-major samples.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
