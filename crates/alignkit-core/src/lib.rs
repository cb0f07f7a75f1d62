//! # AlignKit Core
//!
//! Core types and the geometric calibration engine for AlignKit.
//! Provides planar points, case-insensitive device names, affine and
//! rotation-center solvers, the axis-sign convention, the error taxonomy
//! and the alignment event bus.

pub mod axis;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod geometry;
pub mod types;

pub use axis::{compute_sign_u, AxisDir, RotDir};

pub use data::{DeviceName, Point3};

pub use error::{AlignmentError, Error, GeometryError, Result};

pub use event_bus::{
    AlignEvent, AlignmentEvent, CalibrationEvent, EventBus, EventBusConfig, EventCategory,
    EventFilter, RegistrationEvent, SequencerEvent, SubscriptionId,
};

pub use geometry::{
    circle_fit, rotate_point, rotation_center, rotation_center_angle_pair, solve_affine,
    AffineFit, AffineTransform, CalibrationInfo, CircleFit, RotationCenterFit, RotationMethod,
};

pub use types::{
    thread_safe, thread_safe_map, thread_safe_rw, thread_safe_rw_map, ThreadSafe, ThreadSafeMap,
    ThreadSafeRw, ThreadSafeRwMap,
};
