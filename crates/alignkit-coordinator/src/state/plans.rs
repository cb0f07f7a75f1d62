//! In-progress plans
//!
//! Plans live only in memory and are discarded by a reset or on completion.

use alignkit_core::{DeviceName, Point3};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Calibration uses at most this many captures: 9 for the affine fit, 3 for the rotation center
pub const MAX_CALIBRATION_POINTS: usize = 12;

/// Captures fed to the affine fit
pub const AFFINE_POINTS: usize = 9;

/// Captures fed to the rotation-center estimate
pub const ROTATION_POINTS: usize = 3;

/// How long a Register/Align aggregation waits for its cameras
pub const AGGREGATION_TIMEOUT_SECS: i64 = 3;

/// Accumulating multi-point calibration for one (connection, camera)
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPlan {
    pub job_id: String,
    /// Robot pose when the plan started; recorded once
    pub base_robot: Point3,
    /// Ideal real positions, one per capture
    pub pos_list: Vec<Point3>,
    /// Relative move to apply after each capture
    pub steps: Vec<Point3>,
    /// `(pixel, ideal real)` per capture
    pub pairs: Vec<(Point3, Point3)>,
    pub required_count: usize,
    pub done: bool,
}

impl CalibrationPlan {
    pub fn new(
        job_id: impl Into<String>,
        base_robot: Point3,
        pos_list: Vec<Point3>,
        steps: Vec<Point3>,
    ) -> Self {
        let required_count = pos_list.len().min(MAX_CALIBRATION_POINTS);
        Self {
            job_id: job_id.into(),
            base_robot,
            pos_list,
            steps,
            pairs: Vec::with_capacity(required_count),
            required_count,
            done: false,
        }
    }

    pub fn completed(&self) -> usize {
        self.pairs.len()
    }

    /// Captures needed before solving; never fewer than 3
    pub fn threshold(&self) -> usize {
        self.required_count.max(3)
    }

    pub fn is_ready(&self) -> bool {
        self.completed() >= self.threshold()
    }

    /// Ideal real position for the next capture
    pub fn next_position(&self) -> Option<Point3> {
        self.pos_list.get(self.completed()).copied()
    }

    /// Move to report after `completed` captures: `steps[completed − 1]`
    ///
    /// Past the end of the move pattern the last step repeats; an empty
    /// pattern yields zero.
    pub fn step_after(&self, completed: usize) -> Point3 {
        let index = completed
            .saturating_sub(1)
            .min(self.steps.len().saturating_sub(1));
        self.steps.get(index).copied().unwrap_or_default()
    }
}

/// Multi-camera aggregation for one (connection, job)
///
/// Completes once every expected camera has contributed a pixel. Each camera
/// contributes at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub job_id: String,
    /// Expected cameras in request order; the first is the representative one
    pub expected: Vec<DeviceName>,
    pub pixels: HashMap<DeviceName, Point3>,
    /// Robot pose recorded when the plan was created
    pub real_snapshot: Point3,
    pub deadline: DateTime<Utc>,
}

/// Golden-position registration across cameras
pub type RegistrationPlan = AggregationPlan;

/// Live alignment across cameras
pub type AlignmentJob = AggregationPlan;

impl AggregationPlan {
    pub fn new(
        job_id: impl Into<String>,
        expected: Vec<DeviceName>,
        real_snapshot: Point3,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            expected,
            pixels: HashMap::new(),
            real_snapshot,
            deadline: now + Duration::seconds(AGGREGATION_TIMEOUT_SECS),
        }
    }

    pub fn has(&self, camera: &DeviceName) -> bool {
        self.pixels.contains_key(camera)
    }

    /// Store a camera's pixel; returns false if it already reported
    pub fn record(&mut self, camera: DeviceName, pixel: Point3) -> bool {
        if self.pixels.contains_key(&camera) {
            return false;
        }
        self.pixels.insert(camera, pixel);
        true
    }

    /// Every expected camera has reported
    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|cam| self.pixels.contains_key(cam))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    /// `(reported expected cameras, expected cameras)`
    pub fn progress(&self) -> (usize, usize) {
        let reported = self.expected.iter().filter(|c| self.pixels.contains_key(*c)).count();
        (reported, self.expected.len())
    }

    /// Pixels of the expected cameras in request order, if complete
    pub fn ordered_pixels(&self) -> Option<Vec<(DeviceName, Point3)>> {
        self.expected
            .iter()
            .map(|cam| self.pixels.get(cam).map(|px| (cam.clone(), *px)))
            .collect()
    }
}
