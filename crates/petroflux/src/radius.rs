//! Petrosian radius: radial surface-brightness convergence scan.
//!
//! Concentric elliptical rings grow around the centroid until the mean
//! surface brightness of the outer ring drops below `eta` times the mean of
//! the enclosed disk. The converged ring midpoint, scaled by `factor` and
//! floored at `min_radius`, is the Petrosian radius used by every later
//! aperture measurement of the source.

use serde::{Deserialize, Serialize};

use crate::aperture::{Aperture, EllipseShape, EllipticalAperture};
use crate::error::Result;
use crate::frame::Frame;
use crate::neighbour::{NeighbourMask, PixelCoord};
use crate::Centroid;

/// Fixed maximum scan extent in units of the ellipse scale.
pub const N_SIGMA: f64 = 6.0;

/// Tuning parameters of the radius scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusConfig {
    /// Outer/inner surface-brightness ratio at which the scan converges.
    pub eta: f64,
    /// Scale factor applied to the converged ring midpoint.
    pub factor: f64,
    /// Floor on the final radius.
    pub min_radius: f64,
}

impl Default for RadiusConfig {
    fn default() -> Self {
        Self {
            eta: 0.2,
            factor: 2.0,
            min_radius: 3.5,
        }
    }
}

/// Outcome of the convergence scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusScan {
    /// Final radius: `max(kmean * factor, min_radius)`.
    pub radius: f64,
    /// Ring midpoint at which the scan stopped (last ring when it never
    /// converged).
    pub kmean: f64,
    /// Whether the brightness ratio actually crossed `eta`. When `false`,
    /// `kmean` is the best-effort last ring midpoint.
    pub converged: bool,
    /// Whether a pixel of another source falls inside the scan region.
    pub neighbour_contaminated: bool,
}

/// Run the convergence scan on the detection frame.
///
/// Pixels whose variance is at or above the frame's threshold read as zero;
/// the neighbour mask is consulted only for the contamination flag, never for
/// the convergence arithmetic.
///
/// The scan itself cannot fail; the only error is a degenerate ellipse shape.
pub fn petrosian_radius(
    centroid: Centroid,
    shape: EllipseShape,
    frame: &Frame,
    source_pixels: &[PixelCoord],
    config: &RadiusConfig,
) -> Result<RadiusScan> {
    let reference = EllipticalAperture::new(shape, N_SIGMA)?;
    let bbox = reference.bounding_box(centroid.x, centroid.y);

    let step_size = N_SIGMA / 20.0;
    let mut kmean = 0.0;
    let mut converged = false;

    let mut kmin = step_size;
    loop {
        let kmax = kmin * 1.2;
        if kmax >= N_SIGMA {
            break;
        }
        kmean = (kmin + kmax) / 2.0;

        let kmin2 = kmin * kmin;
        let kmean2 = kmean * kmean;
        let kmax2 = kmax * kmax;

        let mut flux_outer = 0.0;
        let mut flux_inner = 0.0;
        let mut area_outer = 0.0;
        let mut area_inner = 0.0;

        for y in bbox.min_y..bbox.max_y {
            for x in bbox.min_x..bbox.max_x {
                if !frame.image.in_bounds(x, y) {
                    continue;
                }
                let pixel_value = if frame.is_valid(x, y) {
                    frame.image.value(x, y)
                } else {
                    0.0
                };
                let r2 = shape.radius_squared(x as f64 - centroid.x, y as f64 - centroid.y);

                // The disk test range deliberately overlaps the ring between
                // kmin and kmean; downstream results depend on this exact
                // classification.
                if r2 <= kmax2 {
                    if r2 >= kmin2 {
                        flux_outer += pixel_value;
                        area_outer += 1.0;
                    }
                    if r2 < kmean2 {
                        flux_inner += pixel_value;
                        area_inner += 1.0;
                    }
                }
            }
        }

        if area_inner > 0.0 && area_outer > 0.0
            && flux_outer / area_outer < config.eta * (flux_inner / area_inner)
        {
            converged = true;
            break;
        }
        kmin += step_size;
    }

    let neighbour_contaminated = frame.labels.as_ref().is_some_and(|labels| {
        let mask = NeighbourMask::new(bbox, source_pixels, labels);
        let n2 = N_SIGMA * N_SIGMA;
        let mut hit = false;
        'scan: for y in bbox.min_y..bbox.max_y {
            for x in bbox.min_x..bbox.max_x {
                if mask.is_neighbour(x, y)
                    && shape.radius_squared(x as f64 - centroid.x, y as f64 - centroid.y) <= n2
                {
                    hit = true;
                    break 'scan;
                }
            }
        }
        hit
    });

    Ok(RadiusScan {
        radius: (kmean * config.factor).max(config.min_radius),
        kmean,
        converged,
        neighbour_contaminated,
    })
}
