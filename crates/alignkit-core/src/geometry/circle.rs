//! Algebraic (Kåsa) circle fit

use crate::data::Point3;
use crate::error::GeometryError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Fitted circle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    /// Circle center (U is zero)
    pub center: Point3,
    /// Radius from the algebraic solution
    pub radius: f64,
    /// RMS of each point's distance to the center about the mean distance
    pub rmse: f64,
}

/// Fit `x² + y² + A·x + B·y + C = 0` to at least three points
///
/// Points are mean-centered before building the 3×3 normal equations. The
/// reported error is geometric: how far each measured radius strays from the
/// mean measured radius.
pub fn circle_fit(points: &[Point3]) -> Result<CircleFit, GeometryError> {
    let n = points.len();
    if n < 3 {
        return Err(GeometryError::invalid_input(format!(
            "circle fit needs ≥3 points, got {}",
            n
        )));
    }

    let inv_n = 1.0 / n as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() * inv_n;
    let my = points.iter().map(|p| p.y).sum::<f64>() * inv_n;

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let u = p.x - mx;
        let v = p.y - my;
        let row = Vector3::new(u, v, 1.0);
        let z = -(u * u + v * v);
        ata += row * row.transpose();
        atb += row * z;
    }

    // Collinear samples leave the normal matrix rank deficient
    let scale = ata.diagonal().max().max(f64::EPSILON);
    if ata.determinant().abs() < 1e-12 * scale * scale * scale {
        return Err(GeometryError::degenerate("circle points are collinear"));
    }

    let sol = ata
        .lu()
        .solve(&atb)
        .filter(|s| s.iter().all(|v| v.is_finite()))
        .ok_or_else(|| GeometryError::degenerate("circle normal equations are singular"))?;

    let cx0 = -sol[0] / 2.0;
    let cy0 = -sol[1] / 2.0;
    let radius = (cx0 * cx0 + cy0 * cy0 - sol[2]).max(0.0).sqrt();
    let center = Point3::xy(cx0 + mx, cy0 + my);

    let dists: Vec<f64> = points.iter().map(|p| p.distance_to(&center)).collect();
    let mean = dists.iter().sum::<f64>() * inv_n;
    let var = dists.iter().map(|d| (d - mean).powi(2)).sum::<f64>() * inv_n;

    Ok(CircleFit {
        center,
        radius,
        rmse: var.sqrt(),
    })
}
