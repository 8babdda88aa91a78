//! Synthetic source images for tests and the CLI demo harness.

use crate::aperture::EllipseShape;
use crate::buffer::PixelBuffer;

/// Uniform background.
pub fn flat_image(width: usize, height: usize, value: f64) -> PixelBuffer {
    PixelBuffer::constant(width, height, value)
}

/// Zero background with a single bright pixel.
pub fn delta_image(width: usize, height: usize, x: usize, y: usize, amplitude: f64) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |px, py| {
        if px == x && py == y {
            amplitude
        } else {
            0.0
        }
    })
}

/// Axis-aligned elliptical Gaussian profile sampled at pixel centers.
pub fn gaussian_image(
    width: usize,
    height: usize,
    cx: f64,
    cy: f64,
    sigma_x: f64,
    sigma_y: f64,
    amplitude: f64,
) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        amplitude
            * (-0.5 * (dx * dx / (sigma_x * sigma_x) + dy * dy / (sigma_y * sigma_y))).exp()
    })
}

/// Gaussian profile following an arbitrary conic ellipse shape: brightness
/// falls off with the squared elliptical radius.
pub fn elliptical_gaussian_image(
    width: usize,
    height: usize,
    cx: f64,
    cy: f64,
    shape: EllipseShape,
    amplitude: f64,
) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        let r2 = shape.radius_squared(x as f64 - cx, y as f64 - cy);
        amplitude * (-0.5 * r2).exp()
    })
}
