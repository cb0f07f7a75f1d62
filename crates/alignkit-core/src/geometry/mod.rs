//! Geometric calibration engine
//!
//! Stateless math used by the coordinator:
//! - least-squares affine fitting, inversion, composition and decomposition
//! - rotation-center estimation from angle pairs or a circle fit

pub mod affine;
pub mod circle;
pub mod rotation;

pub use affine::{solve_affine, AffineFit, AffineTransform, CalibrationInfo, SINGULAR_EPS};
pub use circle::{circle_fit, CircleFit};
pub use rotation::{
    rotate_point, rotation_center, rotation_center_angle_pair, RotationCenterFit, RotationMethod,
};
