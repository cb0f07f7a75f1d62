//! Calibration data model
//!
//! - [`CalibrationStore`]: committed per-connection calibration
//! - [`CalibrationPlan`] / [`AggregationPlan`]: in-progress work

pub mod calibration;
pub mod plans;

pub use calibration::{CalibrationOutcome, CalibrationStore, PerConnectionCalibration};
pub use plans::{
    AggregationPlan, AlignmentJob, CalibrationPlan, RegistrationPlan, AFFINE_POINTS,
    AGGREGATION_TIMEOUT_SECS, MAX_CALIBRATION_POINTS, ROTATION_POINTS,
};
