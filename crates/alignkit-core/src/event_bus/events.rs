//! Event type definitions for the event bus.
//!
//! Events mirror the coordinator's state transitions. They are cloneable and
//! serializable so a host can log or replay them.

use serde::{Deserialize, Serialize};

use crate::data::Point3;

/// Root event enum for all alignment events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignmentEvent {
    /// Multi-point calibration progress
    Calibration(CalibrationEvent),
    /// Golden-position registration
    Registration(RegistrationEvent),
    /// Live alignment measurements
    Alignment(AlignEvent),
    /// Per-key agents and queues
    Sequencer(SequencerEvent),
}

impl AlignmentEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AlignmentEvent::Calibration(_) => EventCategory::Calibration,
            AlignmentEvent::Registration(_) => EventCategory::Registration,
            AlignmentEvent::Alignment(_) => EventCategory::Alignment,
            AlignmentEvent::Sequencer(_) => EventCategory::Sequencer,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AlignmentEvent::Calibration(e) => e.description(),
            AlignmentEvent::Registration(e) => e.description(),
            AlignmentEvent::Alignment(e) => e.description(),
            AlignmentEvent::Sequencer(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Calibration events.
    Calibration,
    /// Registration events.
    Registration,
    /// Alignment events.
    Alignment,
    /// Sequencer events.
    Sequencer,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Calibration => write!(f, "Calibration"),
            EventCategory::Registration => write!(f, "Registration"),
            EventCategory::Alignment => write!(f, "Alignment"),
            EventCategory::Sequencer => write!(f, "Sequencer"),
        }
    }
}

/// Calibration events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationEvent {
    /// A capture was paired with its pattern position.
    PairRecorded {
        /// Connection name.
        connection: String,
        /// Camera name.
        camera: String,
        /// Pairs collected so far.
        completed: usize,
        /// Pairs needed.
        required: usize,
        /// Captured pixel.
        pixel: Point3,
    },
    /// Transforms and rotation center were committed.
    Completed {
        /// Connection name.
        connection: String,
        /// Camera name.
        camera: String,
        /// Affine fit error.
        rmse: f64,
        /// Estimated rotation center.
        rotation_center: Point3,
        /// Rotation of the pixel→real transform in degrees.
        theta_deg: f64,
    },
    /// Solving failed; nothing was committed.
    Failed {
        /// Connection name.
        connection: String,
        /// Camera name.
        camera: String,
        /// Failure reason.
        reason: String,
    },
    /// Progress or calibration data was cleared.
    Reset {
        /// Connection name.
        connection: String,
        /// Camera, when the reset was camera-scoped.
        camera: Option<String>,
        /// Whether committed calibration was cleared too.
        all_calibration: bool,
    },
}

impl CalibrationEvent {
    fn description(&self) -> String {
        match self {
            CalibrationEvent::PairRecorded {
                connection,
                camera,
                completed,
                required,
                ..
            } => format!("{}/{} pair {}/{}", connection, camera, completed, required),
            CalibrationEvent::Completed {
                connection,
                camera,
                rmse,
                ..
            } => format!("{}/{} calibrated (rmse {:.6})", connection, camera, rmse),
            CalibrationEvent::Failed {
                connection,
                camera,
                reason,
            } => format!("{}/{} calibration failed: {}", connection, camera, reason),
            CalibrationEvent::Reset {
                connection,
                camera,
                all_calibration,
            } => format!(
                "{}{} reset ({})",
                connection,
                camera.as_deref().map(|c| format!("/{}", c)).unwrap_or_default(),
                if *all_calibration { "all" } else { "progress" }
            ),
        }
    }
}

/// Registration events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegistrationEvent {
    /// A camera reported its golden pixel.
    PixelCaptured {
        /// Connection name.
        connection: String,
        /// Job id.
        job: String,
        /// Camera name.
        camera: String,
        /// Cameras reported so far.
        completed: usize,
        /// Cameras expected.
        required: usize,
    },
    /// Every expected camera reported; goldens were committed.
    Completed {
        /// Connection name.
        connection: String,
        /// Job id.
        job: String,
        /// Robot pose recorded as the real golden.
        real_golden: Point3,
    },
}

impl RegistrationEvent {
    fn description(&self) -> String {
        match self {
            RegistrationEvent::PixelCaptured {
                connection,
                job,
                camera,
                completed,
                required,
            } => format!(
                "{} job {}: {} registered ({}/{})",
                connection, job, camera, completed, required
            ),
            RegistrationEvent::Completed {
                connection,
                job,
                real_golden,
            } => format!("{} job {} registered at {}", connection, job, real_golden),
        }
    }
}

/// Alignment events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignEvent {
    /// A camera reported its live reading for a multi-camera job.
    PixelCaptured {
        /// Connection name.
        connection: String,
        /// Job id.
        job: String,
        /// Camera name.
        camera: String,
        /// Cameras reported so far.
        completed: usize,
        /// Cameras expected.
        required: usize,
    },
    /// Offset computed.
    Aligned {
        /// Connection name.
        connection: String,
        /// Job id.
        job: String,
        /// Representative real-space reading.
        real: Point3,
        /// `real − realGolden`.
        offset: Point3,
    },
}

impl AlignEvent {
    fn description(&self) -> String {
        match self {
            AlignEvent::PixelCaptured {
                connection,
                job,
                camera,
                completed,
                required,
            } => format!(
                "{} job {}: {} measured ({}/{})",
                connection, job, camera, completed, required
            ),
            AlignEvent::Aligned {
                connection, offset, ..
            } => format!("{} aligned, offset {}", connection, offset),
        }
    }
}

/// Sequencer events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequencerEvent {
    /// A per-key agent was created.
    AgentStarted {
        /// `connection/camera` key.
        key: String,
    },
    /// A per-key agent finished draining and exited.
    AgentStopped {
        /// `connection/camera` key.
        key: String,
        /// Commands processed over the agent's lifetime.
        processed: u64,
    },
    /// A command was refused because the queue was full.
    QueueRejected {
        /// `connection/camera` key.
        key: String,
        /// Queue capacity.
        capacity: usize,
    },
}

impl SequencerEvent {
    fn description(&self) -> String {
        match self {
            SequencerEvent::AgentStarted { key } => format!("Agent {} started", key),
            SequencerEvent::AgentStopped { key, processed } => {
                format!("Agent {} stopped after {} commands", key, processed)
            }
            SequencerEvent::QueueRejected { key, capacity } => {
                format!("Queue {} full ({})", key, capacity)
            }
        }
    }
}
