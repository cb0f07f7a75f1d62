//! Rotation-center estimation
//!
//! Two estimators are available:
//! - [`rotation_center_angle_pair`]: pairs of samples with known rotation
//!   angles, each pair solving for the pivot directly
//! - [`circle_fit`](super::circle::circle_fit): samples on the arc traced by a
//!   feature rotating about the pivot

use super::circle::circle_fit;
use crate::data::Point3;
use crate::error::GeometryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Angle pairs closer than this (degrees) are skipped
const MIN_DELTA_DEG: f64 = 1e-6;

/// Pair systems with a normal-matrix determinant below this are skipped
const MIN_PAIR_DET: f64 = 1e-18;

/// Which estimator to use for the rotation center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RotationMethod {
    /// Algebraic circle fit through the probe positions
    CircleFit,
    /// Closed-form pivot per pair of angle-tagged samples
    #[default]
    AnglePair,
}

impl fmt::Display for RotationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationMethod::CircleFit => write!(f, "CircleFit"),
            RotationMethod::AnglePair => write!(f, "AnglePair"),
        }
    }
}

/// Estimated rotation center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationCenterFit {
    /// Pivot position (U is zero)
    pub center: Point3,
    /// Fitted radius; only the circle fit produces one
    pub radius: Option<f64>,
    /// Estimator-specific fit error
    pub rmse: f64,
}

/// Rotate `point` about `center` by `angle_deg` (counter-clockwise for positive angles)
pub fn rotate_point(center: &Point3, point: &Point3, angle_deg: f64) -> Point3 {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    Point3 {
        x: center.x + c * dx - s * dy,
        y: center.y + s * dx + c * dy,
        u: point.u,
    }
}

/// Estimate a rotation center from angle-tagged sample pairs
///
/// `points[i]` is the observed position and `angles[i].u` the rotation (in
/// degrees) at which it was observed. For each pair `(i, j)` the pivot `C`
/// satisfies `(I − R(Δθ))·C = Q − R(Δθ)·P`. Each solvable pair contributes one
/// candidate; the result is the mean candidate and the mean pair residual.
pub fn rotation_center_angle_pair(
    points: &[Point3],
    angles: &[Point3],
) -> Result<RotationCenterFit, GeometryError> {
    let n = points.len();
    if n != angles.len() {
        return Err(GeometryError::invalid_input(format!(
            "point counts differ ({} vs {})",
            n,
            angles.len()
        )));
    }
    if n < 2 {
        return Err(GeometryError::invalid_input(format!(
            "angle-pair method needs ≥2 samples, got {}",
            n
        )));
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_err = 0.0;
    let mut count = 0usize;

    for i in 0..n {
        for j in (i + 1)..n {
            let delta = angles[j].u - angles[i].u;
            if delta.abs() < MIN_DELTA_DEG {
                continue;
            }
            let Some((cx, cy, err)) = solve_pair(&points[i], &points[j], delta) else {
                continue;
            };
            sum_x += cx;
            sum_y += cy;
            sum_err += err;
            count += 1;
        }
    }

    if count == 0 {
        return Err(GeometryError::NoValidPairs);
    }

    let k = count as f64;
    Ok(RotationCenterFit {
        center: Point3::xy(sum_x / k, sum_y / k),
        radius: None,
        rmse: sum_err / k,
    })
}

/// Solve one pair's 2×2 normal equations; `None` when the geometry is degenerate
fn solve_pair(p: &Point3, q: &Point3, delta_deg: f64) -> Option<(f64, f64, f64)> {
    let (s, c) = delta_deg.to_radians().sin_cos();

    // A = I − R
    let a11 = 1.0 - c;
    let a12 = s;
    let a21 = -s;
    let a22 = 1.0 - c;

    // v = Q − R·P
    let vx = q.x - (c * p.x - s * p.y);
    let vy = q.y - (s * p.x + c * p.y);

    let n11 = a11 * a11 + a21 * a21;
    let n12 = a11 * a12 + a21 * a22;
    let n22 = a12 * a12 + a22 * a22;
    let b1 = a11 * vx + a21 * vy;
    let b2 = a12 * vx + a22 * vy;

    let det = n11 * n22 - n12 * n12;
    if det.abs() < MIN_PAIR_DET {
        return None;
    }

    let cx = (n22 * b1 - n12 * b2) / det;
    let cy = (n11 * b2 - n12 * b1) / det;

    let ex = a11 * cx + a12 * cy - vx;
    let ey = a21 * cx + a22 * cy - vy;
    Some((cx, cy, ex.hypot(ey)))
}

/// Estimate a rotation center with the chosen method
///
/// The circle fit ignores `angles` and uses only the positions.
pub fn rotation_center(
    method: RotationMethod,
    points: &[Point3],
    angles: &[Point3],
) -> Result<RotationCenterFit, GeometryError> {
    match method {
        RotationMethod::AnglePair => rotation_center_angle_pair(points, angles),
        RotationMethod::CircleFit => {
            let fit = circle_fit(points)?;
            Ok(RotationCenterFit {
                center: fit.center,
                radius: Some(fit.radius),
                rmse: fit.rmse,
            })
        }
    }
}
