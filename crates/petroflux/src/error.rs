//! Library error type.
//!
//! Degenerate numeric situations (non-convergence, zero-area rings, negative
//! flux) are handled locally with sentinel values or flag bits and never show
//! up here; the only hard failures are precondition violations on the inputs.

/// Errors that can occur while setting up a measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureError {
    /// Ellipse coefficients do not describe a positive-definite quadratic form.
    DegenerateEllipse { cxx: f64, cyy: f64, cxy: f64 },
    /// The aperture scale is not a finite non-negative number.
    InvalidScale(f64),
    /// The frame transform is singular and cannot be inverted.
    SingularTransform,
    /// An auxiliary buffer does not match the image dimensions.
    BufferShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// Writing the check image failed.
    CheckImage(String),
}

impl std::fmt::Display for MeasureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegenerateEllipse { cxx, cyy, cxy } => write!(
                f,
                "ellipse coefficients (cxx={}, cyy={}, cxy={}) are not positive-definite",
                cxx, cyy, cxy
            ),
            Self::InvalidScale(s) => {
                write!(f, "aperture scale must be finite and non-negative, got {}", s)
            }
            Self::SingularTransform => write!(f, "frame transform is singular"),
            Self::BufferShape { expected, got } => write!(
                f,
                "buffer shape mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
            Self::CheckImage(msg) => write!(f, "check image write failed: {}", msg),
        }
    }
}

impl std::error::Error for MeasureError {}

pub type Result<T> = std::result::Result<T, MeasureError>;
