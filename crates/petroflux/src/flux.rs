//! Aperture flux integration with masking and point-symmetry correction.
//!
//! Every pixel inside the aperture contributes its value and variance.
//! Invalid pixels (high variance or neighbouring source) may be replaced by
//! their 180°-reflected partner through the centroid; unrecoverable pixels
//! are excluded and flagged. Out-of-image aperture pixels raise the boundary
//! flag. Nothing here throws: quality degradation is reported through flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::aperture::Aperture;
use crate::frame::Frame;
use crate::neighbour::{NeighbourMask, PixelCoord};
use crate::Centroid;

bitflags! {
    /// Quality flags raised during flux integration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct FluxFlags: u8 {
        /// A pixel of another source lies inside the aperture.
        const NEIGHBOR_BLEND = 1 << 0;
        /// The aperture reaches outside the image.
        const BOUNDARY = 1 << 1;
        /// At least one invalid pixel could not be recovered and was dropped.
        const BAD_PIXELS = 1 << 2;
        /// The integral is missing area (dropped or out-of-bounds pixels).
        const INCOMPLETE_APERTURE = 1 << 3;
    }
}

/// Raw aperture integration result; see [`crate::photometry::derive_photometry`]
/// for the calibrated quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Sum of contributing pixel values.
    pub flux: f64,
    /// Sum of contributing pixel variances.
    pub variance: f64,
    /// Number of contributing pixels (substituted partners count once).
    pub area: f64,
    pub flags: FluxFlags,
}

/// Integrate flux and variance inside `aperture` around `centroid`.
///
/// `mask`, when present, classifies pixels of other sources; those are
/// treated like invalid pixels and additionally flagged
/// [`FluxFlags::NEIGHBOR_BLEND`]. With `use_symmetry`, an invalid pixel is
/// replaced by its reflection through the centroid when that partner is in
/// bounds, valid, and not a neighbour.
pub fn measure_flux<A: Aperture + ?Sized>(
    aperture: &A,
    centroid: Centroid,
    frame: &Frame,
    mask: Option<&NeighbourMask>,
    use_symmetry: bool,
) -> Measurement {
    measure_flux_impl(aperture, centroid, frame, mask, use_symmetry, None)
}

/// Like [`measure_flux`], additionally recording the in-bounds aperture
/// footprint for check-image output.
pub fn measure_flux_capturing<A: Aperture + ?Sized>(
    aperture: &A,
    centroid: Centroid,
    frame: &Frame,
    mask: Option<&NeighbourMask>,
    use_symmetry: bool,
    footprint: &mut Vec<PixelCoord>,
) -> Measurement {
    measure_flux_impl(
        aperture,
        centroid,
        frame,
        mask,
        use_symmetry,
        Some(footprint),
    )
}

fn measure_flux_impl<A: Aperture + ?Sized>(
    aperture: &A,
    centroid: Centroid,
    frame: &Frame,
    mask: Option<&NeighbourMask>,
    use_symmetry: bool,
    mut footprint: Option<&mut Vec<PixelCoord>>,
) -> Measurement {
    let bbox = aperture.bounding_box(centroid.x, centroid.y);

    let mut flux = 0.0;
    let mut variance = 0.0;
    let mut area = 0.0;
    let mut flags = FluxFlags::default();

    let is_neighbour = |x: i64, y: i64| mask.is_some_and(|m| m.is_neighbour(x, y));

    for y in bbox.min_y..bbox.max_y {
        for x in bbox.min_x..bbox.max_x {
            if !aperture.is_inside(centroid.x, centroid.y, x as f64, y as f64) {
                continue;
            }
            if !frame.image.in_bounds(x, y) {
                flags |= FluxFlags::BOUNDARY | FluxFlags::INCOMPLETE_APERTURE;
                continue;
            }
            if let Some(fp) = footprint.as_deref_mut() {
                fp.push(PixelCoord { x, y });
            }

            let neighbour = is_neighbour(x, y);
            if neighbour {
                flags |= FluxFlags::NEIGHBOR_BLEND;
            }

            if frame.is_valid(x, y) && !neighbour {
                flux += frame.image.value(x, y);
                variance += frame.pixel_variance(x, y);
                area += 1.0;
                continue;
            }

            // Point-symmetry substitution: same truncation as the original
            // C-style cast of the reflected coordinate.
            if use_symmetry {
                let sx = (2.0 * centroid.x - x as f64) as i64;
                let sy = (2.0 * centroid.y - y as f64) as i64;
                if frame.image.in_bounds(sx, sy)
                    && frame.is_valid(sx, sy)
                    && !is_neighbour(sx, sy)
                {
                    flux += frame.image.value(sx, sy);
                    variance += frame.pixel_variance(sx, sy);
                    area += 1.0;
                    continue;
                }
            }

            flags |= FluxFlags::INCOMPLETE_APERTURE;
            if !neighbour {
                flags |= FluxFlags::BAD_PIXELS;
            }
        }
    }

    Measurement {
        flux,
        variance,
        area,
        flags,
    }
}
