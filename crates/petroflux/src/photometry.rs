//! Calibrated photometric quantities derived from a flux measurement.
//!
//! Pure arithmetic; degenerate fluxes propagate as NaN/Inf per IEEE-754 and a
//! NaN magnitude means "undefined", not an error.

use serde::{Deserialize, Serialize};

use crate::flux::{FluxFlags, Measurement};

/// Pogson ratio: `2.5 / ln(10)`, the factor converting relative flux error to
/// magnitude error.
const POGSON: f64 = 1.0857;

/// Calibrated photometry of one source on one measurement frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    pub flux: f64,
    pub flux_error: f64,
    pub mag: f64,
    pub mag_error: f64,
    pub flags: FluxFlags,
}

/// Convert a raw measurement into calibrated photometry.
///
/// The flux error combines the accumulated background variance with the
/// Poisson term `flux / gain`; a non-positive or non-finite gain disables the
/// Poisson term. Non-positive flux yields a NaN magnitude and an error that
/// propagates to NaN/Inf, deliberately uncorrected.
pub fn derive_photometry(measurement: &Measurement, gain: f64, zero_point: f64) -> Photometry {
    let poisson = if gain.is_finite() && gain > 0.0 {
        measurement.flux / gain
    } else {
        0.0
    };
    let flux_error = (measurement.variance + poisson).sqrt();
    let mag = if measurement.flux > 0.0 {
        -2.5 * measurement.flux.log10() + zero_point
    } else {
        f64::NAN
    };
    let mag_error = POGSON * flux_error / measurement.flux;
    Photometry {
        flux: measurement.flux,
        flux_error,
        mag,
        mag_error,
        flags: measurement.flags,
    }
}

/// Column-major aggregation of per-frame photometries, ordered by frame
/// index, for columnar output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotometryArray {
    pub fluxes: Vec<f64>,
    pub flux_errors: Vec<f64>,
    pub mags: Vec<f64>,
    pub mag_errors: Vec<f64>,
    pub flags: Vec<FluxFlags>,
}

impl PhotometryArray {
    pub fn from_photometries(photometries: &[Photometry]) -> Self {
        let mut array = Self::default();
        for p in photometries {
            array.push(p);
        }
        array
    }

    pub fn push(&mut self, p: &Photometry) {
        self.fluxes.push(p.flux);
        self.flux_errors.push(p.flux_error);
        self.mags.push(p.mag);
        self.mag_errors.push(p.mag_error);
        self.flags.push(p.flags);
    }

    pub fn len(&self) -> usize {
        self.fluxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fluxes.is_empty()
    }
}
