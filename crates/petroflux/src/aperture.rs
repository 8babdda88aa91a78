//! Elliptical apertures in conic form.
//!
//! An aperture is defined by the three conic coefficients `(cxx, cyy, cxy)` of
//! a positive-definite quadratic form plus a scale: a pixel at offset
//! `(dx, dy)` from the centroid is interior when
//! `cxx·dx² + cyy·dy² + cxy·dx·dy <= scale²`. A decorator maps the same
//! aperture onto a geometrically different measurement frame through an
//! affine Jacobian.

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

use crate::error::{MeasureError, Result};

/// Conic-form ellipse coefficients, centered at the origin.
///
/// Produced by an external shape-estimation stage; this crate only validates
/// positive-definiteness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseShape {
    pub cxx: f64,
    pub cyy: f64,
    pub cxy: f64,
}

impl EllipseShape {
    /// Validate and construct. Rejects non-positive-definite forms.
    pub fn new(cxx: f64, cyy: f64, cxy: f64) -> Result<Self> {
        let shape = Self { cxx, cyy, cxy };
        shape.validate()?;
        Ok(shape)
    }

    /// Positive-definiteness check: `cxx > 0` and `4·cxx·cyy − cxy² > 0`.
    pub fn is_positive_definite(&self) -> bool {
        self.cxx.is_finite()
            && self.cyy.is_finite()
            && self.cxy.is_finite()
            && self.cxx > 0.0
            && 4.0 * self.cxx * self.cyy - self.cxy * self.cxy > 0.0
    }

    /// The one hard error of the crate: malformed geometry input.
    pub fn validate(&self) -> Result<()> {
        if self.is_positive_definite() {
            Ok(())
        } else {
            Err(MeasureError::DegenerateEllipse {
                cxx: self.cxx,
                cyy: self.cyy,
                cxy: self.cxy,
            })
        }
    }

    /// Conic coefficients of an ellipse with semi-axes `(a, b)` rotated by
    /// `theta` radians, such that the unit-scale boundary is that ellipse.
    pub fn from_axes(a: f64, b: f64, theta: f64) -> Result<Self> {
        let (sin, cos) = theta.sin_cos();
        Self::new(
            cos * cos / (a * a) + sin * sin / (b * b),
            sin * sin / (a * a) + cos * cos / (b * b),
            2.0 * cos * sin * (1.0 / (a * a) - 1.0 / (b * b)),
        )
    }

    /// Squared elliptical radius of an offset from the ellipse center.
    ///
    /// An offset lies on the `k`-scaled boundary when this equals `k²`.
    #[inline]
    pub fn radius_squared(&self, dx: f64, dy: f64) -> f64 {
        self.cxx * dx * dx + self.cyy * dy * dy + self.cxy * dx * dy
    }

    /// Axis-aligned half-extents `(ex, ey)` of the unit-scale ellipse.
    ///
    /// From the inverse of the quadratic-form matrix: the extreme `dx` on the
    /// boundary is `sqrt(cyy / det)` with `det = cxx·cyy − cxy²/4`.
    pub fn half_extents(&self) -> (f64, f64) {
        let det = self.cxx * self.cyy - 0.25 * self.cxy * self.cxy;
        ((self.cyy / det).sqrt(), (self.cxx / det).sqrt())
    }
}

/// Half-open integer pixel rectangle `[min_x, max_x) × [min_y, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl BoundingBox {
    /// Conservative box around an ellipse of the given half-extents.
    fn around(cx: f64, cy: f64, ex: f64, ey: f64) -> Self {
        Self {
            min_x: (cx - ex).floor() as i64,
            min_y: (cy - ey).floor() as i64,
            max_x: (cx + ex).ceil() as i64 + 1,
            max_y: (cy + ey).ceil() as i64 + 1,
        }
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }
}

/// Common aperture interface used by the flux scan.
///
/// The bounding box must be conservative: every pixel satisfying
/// [`Aperture::is_inside`] lies within it. Downstream scans rely on this.
pub trait Aperture {
    /// Squared elliptical radius of pixel `(x, y)` relative to centroid `(cx, cy)`.
    fn radius_squared(&self, cx: f64, cy: f64, x: f64, y: f64) -> f64;

    /// Boundary scale of this aperture.
    fn scale(&self) -> f64;

    /// Interior test at the aperture's own scale.
    fn is_inside(&self, cx: f64, cy: f64, x: f64, y: f64) -> bool {
        let s = self.scale();
        self.radius_squared(cx, cy, x, y) <= s * s
    }

    /// Integer pixel rectangle guaranteed to contain the aperture interior.
    fn bounding_box(&self, cx: f64, cy: f64) -> BoundingBox;
}

/// An ellipse shape scaled to a measurement radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipticalAperture {
    shape: EllipseShape,
    scale: f64,
}

impl EllipticalAperture {
    /// A zero scale is accepted: the aperture then covers only points at
    /// elliptical radius exactly zero.
    pub fn new(shape: EllipseShape, scale: f64) -> Result<Self> {
        shape.validate()?;
        if !(scale.is_finite() && scale >= 0.0) {
            return Err(MeasureError::InvalidScale(scale));
        }
        Ok(Self { shape, scale })
    }

    pub fn shape(&self) -> EllipseShape {
        self.shape
    }
}

impl Aperture for EllipticalAperture {
    #[inline]
    fn radius_squared(&self, cx: f64, cy: f64, x: f64, y: f64) -> f64 {
        self.shape.radius_squared(x - cx, y - cy)
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn bounding_box(&self, cx: f64, cy: f64) -> BoundingBox {
        let (ex, ey) = self.shape.half_extents();
        BoundingBox::around(cx, cy, ex * self.scale, ey * self.scale)
    }
}

/// Affine Jacobian mapping detection-frame pixel offsets to measurement-frame
/// pixel offsets. Row-major `[[a, b], [c, d]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl FrameTransform {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
        }
    }

    /// Map a detection-frame offset into the measurement frame.
    #[inline]
    pub fn forward(&self, dx: f64, dy: f64) -> (f64, f64) {
        (self.a * dx + self.b * dy, self.c * dx + self.d * dy)
    }

    fn try_inverse(&self) -> Option<Self> {
        let m = Matrix2::new(self.a, self.b, self.c, self.d);
        let inv = m.try_inverse()?;
        Some(Self {
            a: inv[(0, 0)],
            b: inv[(0, 1)],
            c: inv[(1, 0)],
            d: inv[(1, 1)],
        })
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Decorator reusing a detection-frame aperture, unmodified in shape, on a
/// measurement frame with a different pixel grid.
///
/// Queried offsets are mapped back into the detection frame through the
/// inverse Jacobian before delegating to the base ellipse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformedAperture {
    base: EllipticalAperture,
    forward: FrameTransform,
    inverse: FrameTransform,
}

impl TransformedAperture {
    pub fn new(base: EllipticalAperture, transform: FrameTransform) -> Result<Self> {
        let inverse = transform
            .try_inverse()
            .ok_or(MeasureError::SingularTransform)?;
        Ok(Self {
            base,
            forward: transform,
            inverse,
        })
    }
}

impl Aperture for TransformedAperture {
    #[inline]
    fn radius_squared(&self, cx: f64, cy: f64, x: f64, y: f64) -> f64 {
        let (dx, dy) = self.inverse.forward(x - cx, y - cy);
        self.base.shape.radius_squared(dx, dy)
    }

    fn scale(&self) -> f64 {
        self.base.scale
    }

    fn bounding_box(&self, cx: f64, cy: f64) -> BoundingBox {
        // Push the base box corners through the Jacobian and take the hull.
        let (ex, ey) = self.base.shape.half_extents();
        let (ex, ey) = (ex * self.base.scale, ey * self.base.scale);
        let mut mx: f64 = 0.0;
        let mut my: f64 = 0.0;
        for (sx, sy) in [(ex, ey), (ex, -ey), (-ex, ey), (-ex, -ey)] {
            let (tx, ty) = self.forward.forward(sx, sy);
            mx = mx.max(tx.abs());
            my = my.max(ty.abs());
        }
        BoundingBox::around(cx, cy, mx, my)
    }
}
