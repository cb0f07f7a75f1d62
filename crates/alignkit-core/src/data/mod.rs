//! Data models for planar points and device names
//!
//! This module provides:
//! - `Point3`, a planar coordinate with a rotation/third-axis component
//! - `DeviceName`, a case-insensitive key for connections and cameras

mod name;

pub use name::DeviceName;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Planar coordinate with a rotation component
///
/// `x`/`y` are the 2-D position. `u` is the rotation angle in degrees where a
/// rotation is meant, and a third logical axis elsewhere (for example a step
/// scale for the U axis).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Rotation (degrees) or third axis
    pub u: f64,
}

impl Point3 {
    /// The origin with zero rotation
    pub const ZERO: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        u: 0.0,
    };

    /// Create a new point
    pub const fn new(x: f64, y: f64, u: f64) -> Self {
        Self { x, y, u }
    }

    /// Create a planar point with zero rotation
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, u: 0.0 }
    }

    /// Add another point (component-wise)
    pub fn add(&self, other: &Point3) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            u: self.u + other.u,
        }
    }

    /// Subtract another point (component-wise)
    pub fn subtract(&self, other: &Point3) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            u: self.u - other.u,
        }
    }

    /// Component-wise product, used to scale a unit pattern by per-axis step sizes
    pub fn scale(&self, factors: &Point3) -> Self {
        Self {
            x: self.x * factors.x,
            y: self.y * factors.y,
            u: self.u * factors.u,
        }
    }

    /// Same point with the rotation component replaced
    pub fn with_u(&self, u: f64) -> Self {
        Self { u, ..*self }
    }

    /// Planar (XY) distance to another point
    pub fn distance_to(&self, other: &Point3) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Check that every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.u.is_finite()
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} U:{:.3}", self.x, self.y, self.u)
    }
}

impl From<(f64, f64, f64)> for Point3 {
    fn from((x, y, u): (f64, f64, f64)) -> Self {
        Self { x, y, u }
    }
}
