//! Six-parameter affine transforms
//!
//! `X' = a·x + b·y + c`, `Y' = d·x + e·y + f`. The U component of a point is
//! carried through unchanged.

use crate::data::Point3;
use crate::error::GeometryError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Determinant magnitude below which a transform is treated as singular
pub const SINGULAR_EPS: f64 = 1e-12;

/// Singular values below this (relative to the largest) are dropped by the SVD solve
const SVD_EPS: f64 = 1e-12;

/// Floor for the squared x-scale when extracting shear
const SHEAR_EPS: f64 = 1e-12;

/// Affine map between two planar frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    /// Identity transform
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// Create a transform from its six coefficients
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Rotation by `theta_deg`, uniform `scale`, then translation `(tx, ty)`
    pub fn from_similarity(theta_deg: f64, scale: f64, tx: f64, ty: f64) -> Self {
        let (s, c) = theta_deg.to_radians().sin_cos();
        Self {
            a: scale * c,
            b: -scale * s,
            c: tx,
            d: scale * s,
            e: scale * c,
            f: ty,
        }
    }

    /// Determinant of the 2×2 linear part
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Map a point; the U component passes through
    pub fn apply(&self, p: &Point3) -> Point3 {
        Point3 {
            x: self.a * p.x + self.b * p.y + self.c,
            y: self.d * p.x + self.e * p.y + self.f,
            u: p.u,
        }
    }

    /// Analytic inverse
    ///
    /// Fails with [`GeometryError::Singular`] when `|det| < 1e-12`.
    pub fn invert(&self) -> Result<AffineTransform, GeometryError> {
        let det = self.determinant();
        if det.abs() < SINGULAR_EPS {
            return Err(GeometryError::Singular { det });
        }

        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        let c = -(a * self.c + b * self.f);
        let f = -(d * self.c + e * self.f);
        Ok(AffineTransform { a, b, c, d, e, f })
    }

    /// Composition `self ∘ inner`: applies `inner` first, then `self`
    pub fn compose(&self, inner: &AffineTransform) -> AffineTransform {
        let t1 = self;
        let t2 = inner;
        AffineTransform {
            a: t1.a * t2.a + t1.b * t2.d,
            b: t1.a * t2.b + t1.b * t2.e,
            c: t1.a * t2.c + t1.b * t2.f + t1.c,
            d: t1.d * t2.a + t1.e * t2.d,
            e: t1.d * t2.b + t1.e * t2.e,
            f: t1.d * t2.c + t1.e * t2.f + t1.f,
        }
    }

    /// Coefficients in solver order `[a, b, c, d, e, f]`
    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotation, scale and shear extracted from an affine transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInfo {
    /// Rotation angle, `atan2(d, a)` in degrees
    pub theta_deg: f64,
    /// X scale
    pub sx: f64,
    /// Y scale
    pub sy: f64,
    /// Shear after removing the rotation
    pub shear: f64,
    /// Length of the first de-rotated basis vector
    pub ssx: f64,
    /// Height of the second de-rotated basis vector orthogonal to the first
    pub ssy: f64,
}

impl AffineTransform {
    /// Split the linear part into rotation, scale and shear
    ///
    /// Rotation is removed first and shear is measured on the de-rotated
    /// basis. Scales divide by whichever of `cos θ`/`sin θ` is larger.
    pub fn decompose(&self) -> CalibrationInfo {
        let theta = self.d.atan2(self.a);
        let (s, c) = theta.sin_cos();

        let (sx, sy) = if c.abs() >= s.abs() {
            (self.a / c, self.e / c)
        } else {
            (self.d / s, -self.b / s)
        };

        // R(-θ) · [[a, b], [d, e]]
        let col1 = (c * self.a + s * self.d, -s * self.a + c * self.d);
        let col2 = (c * self.b + s * self.e, -s * self.b + c * self.e);

        let ssx_sq = col1.0 * col1.0 + col1.1 * col1.1;
        let ssx = ssx_sq.sqrt();
        let shear = (col1.0 * col2.0 + col1.1 * col2.1) / ssx_sq.max(SHEAR_EPS);
        let col2_sq = col2.0 * col2.0 + col2.1 * col2.1;
        let ssy = (col2_sq - shear * shear * ssx_sq).max(0.0).sqrt();

        CalibrationInfo {
            theta_deg: theta.to_degrees(),
            sx,
            sy,
            shear,
            ssx,
            ssy,
        }
    }
}

/// Result of a least-squares affine fit
#[derive(Debug, Clone, PartialEq)]
pub struct AffineFit {
    /// Fitted pixel→real transform
    pub transform: AffineTransform,
    /// Per-equation residuals `M·x − b`, X and Y rows interleaved
    pub residuals: Vec<f64>,
    /// `sqrt(Σ residual² / n)` with `n` the number of point pairs
    pub rmse: f64,
}

/// Fit an affine transform mapping `src` onto `dst` in the least-squares sense
///
/// Builds the `2n×6` system (one X row and one Y row per pair) and solves it
/// by SVD, falling back to a QR solve if the SVD yields no usable solution.
pub fn solve_affine(src: &[Point3], dst: &[Point3]) -> Result<AffineFit, GeometryError> {
    let n = src.len();
    if n != dst.len() {
        return Err(GeometryError::invalid_input(format!(
            "point counts differ ({} vs {})",
            n,
            dst.len()
        )));
    }
    if n < 3 {
        return Err(GeometryError::invalid_input(format!(
            "need ≥3 pairs, got {}",
            n
        )));
    }

    let mut m = DMatrix::<f64>::zeros(2 * n, 6);
    let mut rhs = DVector::<f64>::zeros(2 * n);
    for (i, (s, t)) in src.iter().zip(dst).enumerate() {
        let r = 2 * i;
        m[(r, 0)] = s.x;
        m[(r, 1)] = s.y;
        m[(r, 2)] = 1.0;
        rhs[r] = t.x;

        m[(r + 1, 3)] = s.x;
        m[(r + 1, 4)] = s.y;
        m[(r + 1, 5)] = 1.0;
        rhs[r + 1] = t.y;
    }

    let x = match solve_svd(&m, &rhs) {
        Some(x) => x,
        None => {
            tracing::debug!("SVD solve failed for {} pairs, falling back to QR", n);
            solve_qr(&m, &rhs).ok_or_else(|| {
                GeometryError::degenerate("affine system is rank deficient")
            })?
        }
    };

    let residual = &m * &x - &rhs;
    let residuals: Vec<f64> = residual.iter().copied().collect();
    let sse: f64 = residuals.iter().map(|r| r * r).sum();

    Ok(AffineFit {
        transform: AffineTransform::new(x[0], x[1], x[2], x[3], x[4], x[5]),
        residuals,
        rmse: (sse / n as f64).sqrt(),
    })
}

fn solve_svd(m: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = m.clone().try_svd(true, true, f64::EPSILON, 0)?;
    let max_sv = svd.singular_values.max();
    let x = svd.solve(rhs, SVD_EPS * max_sv.max(1.0)).ok()?;
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn solve_qr(m: &DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    let qr = m.clone().qr();
    let qtb = qr.q().transpose() * rhs;
    let x = qr.r().solve_upper_triangular(&qtb)?;
    x.iter().all(|v| v.is_finite()).then_some(x)
}
