//! Machine axis conventions
//!
//! How the robot's positive X/Y directions and rotation handedness appear in
//! the camera image. Used to sign-correct rotation angles before estimating a
//! rotation center.

use crate::error::AlignmentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image direction of a positive machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisDir {
    Right,
    Left,
    Up,
    Down,
}

impl AxisDir {
    /// Unit vector in image coordinates (Y grows downward)
    pub fn to_vec(self) -> (i32, i32) {
        match self {
            AxisDir::Right => (1, 0),
            AxisDir::Left => (-1, 0),
            AxisDir::Down => (0, 1),
            AxisDir::Up => (0, -1),
        }
    }
}

impl fmt::Display for AxisDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AxisDir::Right => "Right",
            AxisDir::Left => "Left",
            AxisDir::Up => "Up",
            AxisDir::Down => "Down",
        };
        f.write_str(s)
    }
}

/// Positive rotation direction of the U axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RotDir {
    /// Counter-clockwise
    #[default]
    Ccw,
    /// Clockwise
    Cw,
}

/// Sign multiplier for U angles: `det([x | y]) × (+1 for Ccw, −1 for Cw)`
///
/// Fails with [`AlignmentError::InvalidAxisConfig`] unless one direction is
/// horizontal and the other vertical.
pub fn compute_sign_u(
    x_positive: AxisDir,
    y_positive: AxisDir,
    rotation: RotDir,
) -> Result<i32, AlignmentError> {
    let (xx, xy) = x_positive.to_vec();
    let (yx, yy) = y_positive.to_vec();

    if xx * yx + xy * yy != 0 {
        return Err(AlignmentError::InvalidAxisConfig {
            x_positive: x_positive.to_string(),
            y_positive: y_positive.to_string(),
        });
    }

    let det = xx * yy - xy * yx;
    let rot = match rotation {
        RotDir::Ccw => 1,
        RotDir::Cw => -1,
    };
    Ok(det * rot)
}
