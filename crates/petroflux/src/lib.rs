//! Petrosian-radius aperture photometry.
//!
//! Given detected sources (centroid plus conic ellipse shape), the crate
//! finds each source's Petrosian radius on the detection frame, integrates
//! flux inside the resulting elliptical aperture on one or more measurement
//! frames, and derives calibrated magnitudes with error estimates.
//!
//! The main entry points are [`pipeline::measure_source`] and the parallel
//! batch variant [`pipeline::measure_sources`]; the individual stages
//! ([`radius::petrosian_radius`], [`flux::measure_flux`],
//! [`photometry::derive_photometry`]) are public for callers that need finer
//! control.

use serde::{Deserialize, Serialize};

pub mod aperture;
pub mod buffer;
pub mod checkimage;
pub mod error;
pub mod flux;
pub mod frame;
pub mod neighbour;
pub mod photometry;
pub mod pipeline;
pub mod radius;
pub mod synth;

pub use aperture::{
    Aperture, BoundingBox, EllipseShape, EllipticalAperture, FrameTransform, TransformedAperture,
};
pub use buffer::PixelBuffer;
pub use checkimage::CheckImage;
pub use error::{MeasureError, Result};
pub use flux::{measure_flux, measure_flux_capturing, FluxFlags, Measurement};
pub use frame::Frame;
pub use neighbour::{NeighbourMask, PixelCoord};
pub use photometry::{derive_photometry, Photometry, PhotometryArray};
pub use pipeline::{
    measure_source, measure_sources, MeasureConfig, MeasurementFrame, Source, SourcePhotometry,
};
pub use radius::{petrosian_radius, RadiusConfig, RadiusScan, N_SIGMA};

/// Sub-pixel source position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}
