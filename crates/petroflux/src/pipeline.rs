//! Per-source measurement pipeline: radius scan on the detection frame, then
//! aperture photometry on every measurement frame.

use std::sync::Mutex;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aperture::{
    Aperture, EllipseShape, EllipticalAperture, FrameTransform, TransformedAperture,
};
use crate::checkimage::CheckImage;
use crate::error::Result;
use crate::flux::{measure_flux, measure_flux_capturing, FluxFlags, Measurement};
use crate::frame::Frame;
use crate::neighbour::{NeighbourMask, PixelCoord};
use crate::photometry::{derive_photometry, Photometry, PhotometryArray};
use crate::radius::{petrosian_radius, RadiusConfig, RadiusScan};
use crate::Centroid;

/// A detected source handed to the pipeline by the detection stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: u32,
    /// Centroid on the detection frame.
    pub centroid: Centroid,
    /// Conic shape estimated from the detection-frame moments.
    pub shape: EllipseShape,
    /// Detection-frame pixels belonging to this source, used to separate it
    /// from its neighbours in the label raster.
    #[serde(default)]
    pub pixels: Vec<PixelCoord>,
    /// Centroid on each measurement frame; defaults to the detection centroid
    /// when empty.
    #[serde(default)]
    pub frame_centroids: Vec<Centroid>,
}

/// Pipeline-level configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    pub radius: RadiusConfig,
    /// Magnitude zero point applied to every frame.
    pub zero_point: f64,
    /// Whether invalid pixels may be recovered from their point-symmetric
    /// partner.
    pub use_symmetry: bool,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            radius: RadiusConfig::default(),
            zero_point: 0.0,
            use_symmetry: true,
        }
    }
}

/// A measurement frame with its optional pixel-grid mapping from the
/// detection frame.
#[derive(Debug, Clone)]
pub struct MeasurementFrame {
    pub frame: Frame,
    /// Jacobian of the detection-to-measurement coordinate mapping; `None`
    /// for frames sharing the detection grid.
    pub transform: Option<FrameTransform>,
}

impl MeasurementFrame {
    pub fn untransformed(frame: Frame) -> Self {
        Self {
            frame,
            transform: None,
        }
    }
}

/// Complete measurement record of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePhotometry {
    pub id: u32,
    pub radius: RadiusScan,
    /// Per-frame photometry, ordered by frame index.
    pub photometry: Vec<Photometry>,
    /// The same photometry in columnar form.
    pub columns: PhotometryArray,
}

/// Measure one source: run the radius scan on `detection`, then integrate the
/// resulting aperture on every measurement frame.
///
/// When `check` is given it holds one raster per measurement frame, keyed by
/// frame index; each frame's aperture footprint is stamped into its own
/// raster with `id + 1` so source 0 stays distinguishable from the
/// background.
pub fn measure_source(
    source: &Source,
    detection: &Frame,
    frames: &[MeasurementFrame],
    config: &MeasureConfig,
    check: Option<&[Mutex<CheckImage>]>,
) -> Result<SourcePhotometry> {
    let scan = petrosian_radius(
        source.centroid,
        source.shape,
        detection,
        &source.pixels,
        &config.radius,
    )?;
    if !scan.converged {
        tracing::debug!(
            "source {}: radius scan did not converge, using last ring (kmean={:.3})",
            source.id,
            scan.kmean
        );
    }
    let base = EllipticalAperture::new(source.shape, scan.radius)?;

    let mut photometry = Vec::with_capacity(frames.len());
    for (index, mf) in frames.iter().enumerate() {
        let centroid = source
            .frame_centroids
            .get(index)
            .copied()
            .unwrap_or(source.centroid);

        let transformed;
        let aperture: &dyn Aperture = match mf.transform {
            Some(t) => {
                transformed = TransformedAperture::new(base, t)?;
                &transformed
            }
            None => &base,
        };

        let bbox = aperture.bounding_box(centroid.x, centroid.y);
        let mask = mf
            .frame
            .labels
            .as_ref()
            .map(|labels| NeighbourMask::new(bbox, &source.pixels, labels));

        let mut measurement = measure_with_footprint(
            aperture,
            centroid,
            &mf.frame,
            mask.as_ref(),
            config.use_symmetry,
            check.and_then(|rasters| rasters.get(index)),
            source.id,
        );
        if scan.neighbour_contaminated {
            measurement.flags |= FluxFlags::NEIGHBOR_BLEND;
        }

        photometry.push(derive_photometry(
            &measurement,
            mf.frame.gain,
            config.zero_point,
        ));
    }

    let columns = PhotometryArray::from_photometries(&photometry);
    Ok(SourcePhotometry {
        id: source.id,
        radius: scan,
        photometry,
        columns,
    })
}

fn measure_with_footprint(
    aperture: &dyn Aperture,
    centroid: Centroid,
    frame: &Frame,
    mask: Option<&NeighbourMask>,
    use_symmetry: bool,
    check: Option<&Mutex<CheckImage>>,
    id: u32,
) -> Measurement {
    match check {
        Some(check) => {
            let mut footprint = Vec::new();
            let m = measure_flux_capturing(
                aperture,
                centroid,
                frame,
                mask,
                use_symmetry,
                &mut footprint,
            );
            if let Ok(mut check) = check.lock() {
                check.stamp(&footprint, f64::from(id) + 1.0);
            }
            m
        }
        None => measure_flux(aperture, centroid, frame, mask, use_symmetry),
    }
}

/// Measure a batch of sources in parallel. Results keep the input order; the
/// first error aborts the batch.
pub fn measure_sources(
    sources: &[Source],
    detection: &Frame,
    frames: &[MeasurementFrame],
    config: &MeasureConfig,
    check: Option<&[Mutex<CheckImage>]>,
) -> Result<Vec<SourcePhotometry>> {
    tracing::info!(
        "measuring {} sources on {} frames",
        sources.len(),
        frames.len()
    );
    sources
        .par_iter()
        .map(|source| measure_source(source, detection, frames, config, check))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth;
    use approx::assert_relative_eq;

    fn circle() -> EllipseShape {
        EllipseShape::new(1.0, 1.0, 0.0).unwrap()
    }

    fn gaussian_source(id: u32, cx: f64, cy: f64) -> Source {
        Source {
            id,
            centroid: Centroid { x: cx, y: cy },
            shape: circle(),
            pixels: Vec::new(),
            frame_centroids: Vec::new(),
        }
    }

    #[test]
    fn empty_image_yields_undefined_magnitude() {
        let detection = Frame::from_image(synth::flat_image(64, 64, 0.0));
        let frames = [MeasurementFrame::untransformed(detection.clone())];
        let result = measure_source(
            &gaussian_source(0, 32.0, 32.0),
            &detection,
            &frames,
            &MeasureConfig::default(),
            None,
        )
        .unwrap();

        assert!(!result.radius.converged);
        assert_relative_eq!(result.photometry[0].flux, 0.0);
        assert!(result.photometry[0].mag.is_nan());
    }

    #[test]
    fn two_frames_produce_ordered_columns() {
        let detection =
            Frame::from_image(synth::gaussian_image(96, 96, 48.0, 48.0, 3.0, 3.0, 200.0));
        let faint = Frame::from_image(synth::gaussian_image(96, 96, 48.0, 48.0, 3.0, 3.0, 100.0));
        let frames = [
            MeasurementFrame::untransformed(detection.clone()),
            MeasurementFrame::untransformed(faint),
        ];
        let result = measure_source(
            &gaussian_source(3, 48.0, 48.0),
            &detection,
            &frames,
            &MeasureConfig::default(),
            None,
        )
        .unwrap();

        assert_eq!(result.photometry.len(), 2);
        assert_eq!(result.columns.len(), 2);
        assert_relative_eq!(result.columns.fluxes[0], result.photometry[0].flux);
        assert_relative_eq!(result.columns.fluxes[1], result.photometry[1].flux);
        // Half the amplitude, half the flux, same aperture.
        assert_relative_eq!(
            result.photometry[1].flux,
            result.photometry[0].flux / 2.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn batch_keeps_source_order_and_stamps_check_image() {
        let detection =
            Frame::from_image(synth::gaussian_image(96, 96, 48.0, 48.0, 3.0, 3.0, 200.0));
        let frames = [MeasurementFrame::untransformed(detection.clone())];
        let sources = [gaussian_source(0, 40.0, 40.0), gaussian_source(1, 56.0, 56.0)];
        let check = vec![Mutex::new(CheckImage::new(96, 96))];

        let results = measure_sources(
            &sources,
            &detection,
            &frames,
            &MeasureConfig::default(),
            Some(&check),
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 0);
        assert_eq!(results[1].id, 1);

        // Both apertures left a stamp; source 0 stamps value 1, so its pixels
        // are visible too.
        let img = check[0].lock().unwrap().to_gray();
        assert!(img.pixels().any(|p| p[0] > 0));
        assert!(img.get_pixel(40, 40)[0] > 0);
        assert!(img.get_pixel(56, 56)[0] > 0);
    }

    #[test]
    fn each_frame_stamps_its_own_check_image() {
        let detection =
            Frame::from_image(synth::gaussian_image(96, 96, 48.0, 48.0, 3.0, 3.0, 200.0));
        let second = Frame::from_image(synth::gaussian_image(96, 96, 20.0, 20.0, 3.0, 3.0, 200.0));
        let frames = [
            MeasurementFrame::untransformed(detection.clone()),
            MeasurementFrame::untransformed(second),
        ];
        let mut source = gaussian_source(0, 48.0, 48.0);
        source.frame_centroids = vec![
            Centroid { x: 48.0, y: 48.0 },
            Centroid { x: 20.0, y: 20.0 },
        ];
        let check = vec![
            Mutex::new(CheckImage::new(96, 96)),
            Mutex::new(CheckImage::new(96, 96)),
        ];

        measure_source(
            &source,
            &detection,
            &frames,
            &MeasureConfig::default(),
            Some(&check),
        )
        .unwrap();

        let first = check[0].lock().unwrap().to_gray();
        let other = check[1].lock().unwrap().to_gray();
        assert!(first.get_pixel(48, 48)[0] > 0);
        assert_eq!(first.get_pixel(20, 20)[0], 0);
        assert!(other.get_pixel(20, 20)[0] > 0);
        assert_eq!(other.get_pixel(48, 48)[0], 0);
    }

    #[test]
    fn zero_factor_and_floor_shrink_to_point_aperture() {
        // factor = 0 with a zero floor is a legal configuration; the aperture
        // collapses to the exact centroid pixel instead of erroring out.
        let detection = Frame::from_image(synth::delta_image(64, 64, 32, 32, 500.0));
        let frames = [MeasurementFrame::untransformed(detection.clone())];
        let config = MeasureConfig {
            radius: RadiusConfig {
                factor: 0.0,
                min_radius: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = measure_source(
            &gaussian_source(0, 32.0, 32.0),
            &detection,
            &frames,
            &config,
            None,
        )
        .unwrap();
        assert_relative_eq!(result.radius.radius, 0.0);
        assert_relative_eq!(result.photometry[0].flux, 500.0);
    }

    #[test]
    fn source_list_parses_with_optional_fields_omitted() {
        let json = r#"[{"id": 1,
                        "centroid": {"x": 10.0, "y": 12.0},
                        "shape": {"cxx": 1.0, "cyy": 1.0, "cxy": 0.0}}]"#;
        let sources: Vec<Source> = serde_json::from_str(json).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, 1);
        assert!(sources[0].pixels.is_empty());
        assert!(sources[0].frame_centroids.is_empty());
    }

    #[test]
    fn degenerate_source_shape_errors() {
        let detection = Frame::from_image(synth::flat_image(32, 32, 0.0));
        let frames = [MeasurementFrame::untransformed(detection.clone())];
        let mut source = gaussian_source(0, 16.0, 16.0);
        source.shape = EllipseShape {
            cxx: 1.0,
            cyy: 1.0,
            cxy: 5.0,
        };
        assert!(measure_source(
            &source,
            &detection,
            &frames,
            &MeasureConfig::default(),
            None
        )
        .is_err());
    }

    #[test]
    fn contaminated_scan_marks_all_frames_blended() {
        let image = synth::gaussian_image(96, 96, 48.0, 48.0, 3.0, 3.0, 300.0);
        let labels = crate::buffer::PixelBuffer::from_fn(96, 96, |x, y| {
            if x == 52 && y == 48 {
                7.0
            } else {
                0.0
            }
        });
        let mut detection = Frame::from_image(image);
        detection.labels = Some(labels);
        let frames = [MeasurementFrame::untransformed(detection.clone())];

        let result = measure_source(
            &gaussian_source(0, 48.0, 48.0),
            &detection,
            &frames,
            &MeasureConfig::default(),
            None,
        )
        .unwrap();

        assert!(result.radius.neighbour_contaminated);
        assert!(result.photometry[0]
            .flags
            .contains(FluxFlags::NEIGHBOR_BLEND));
    }

    #[test]
    fn rotated_frame_measures_same_flux_on_symmetric_source() {
        // A circular gaussian is rotation invariant, so a 90-degree frame
        // rotation must not change the integrated flux.
        let detection =
            Frame::from_image(synth::gaussian_image(96, 96, 48.0, 48.0, 4.0, 4.0, 150.0));
        let rotation = FrameTransform {
            a: 0.0,
            b: -1.0,
            c: 1.0,
            d: 0.0,
        };
        let frames = [
            MeasurementFrame::untransformed(detection.clone()),
            MeasurementFrame {
                frame: detection.clone(),
                transform: Some(rotation),
            },
        ];
        let result = measure_source(
            &gaussian_source(0, 48.0, 48.0),
            &detection,
            &frames,
            &MeasureConfig::default(),
            None,
        )
        .unwrap();
        assert_relative_eq!(
            result.photometry[0].flux,
            result.photometry[1].flux,
            epsilon = 1e-9
        );
    }
}
