//! Error handling for AlignKit
//!
//! Provides error types for each layer of the system:
//! - Geometry errors (solver input, singular transforms, degenerate samples)
//! - Alignment errors (coordinator preconditions, capture failures, queueing)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Geometry error type
///
/// Raised by the calibration engine. Every variant is recoverable: callers
/// either fall back to another method or report the failure upward.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Malformed solver input (mismatched lengths, too few points)
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected.
        reason: String,
    },

    /// Transform has no inverse
    #[error("Singular transform (det = {det:e})")]
    Singular {
        /// Determinant of the linear part.
        det: f64,
    },

    /// Point set does not constrain the model (collinear points, rank deficiency)
    #[error("Degenerate geometry: {reason}")]
    Degenerate {
        /// What made the geometry degenerate.
        reason: String,
    },

    /// Every angle pair was skipped while estimating a rotation center
    #[error("No valid angle pairs to compute rotation center")]
    NoValidPairs,
}

impl GeometryError {
    /// Shorthand for [`GeometryError::InvalidInput`]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        GeometryError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GeometryError::Degenerate`]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        GeometryError::Degenerate {
            reason: reason.into(),
        }
    }
}

/// Alignment error type
///
/// Represents failures of the coordinator and command sequencer. These are
/// reported to the caller as a failed command result, never as a panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// No capture provider is registered for the camera
    #[error("Vision not set: {camera}")]
    MissingCapability {
        /// The camera without a capture provider.
        camera: String,
    },

    /// Alignment requested before calibration exists
    #[error("No calibration for {connection}/{camera}")]
    MissingCalibration {
        /// The connection that was looked up.
        connection: String,
        /// The camera that was looked up (empty when the connection itself is missing).
        camera: String,
    },

    /// Golden position was never registered for a camera
    #[error("No golden position registered for {connection}/{camera}")]
    MissingGolden {
        /// The connection that was looked up.
        connection: String,
        /// The camera that was looked up.
        camera: String,
    },

    /// X/Y positive directions do not form an orthogonal basis
    #[error("Invalid axis config: XPositive={x_positive}, YPositive={y_positive}. X and Y must be orthogonal (choose one horizontal and one vertical)")]
    InvalidAxisConfig {
        /// Configured X-positive direction.
        x_positive: String,
        /// Configured Y-positive direction.
        y_positive: String,
    },

    /// The calibration pattern is too short for the requested step
    #[error("Calibration pattern exhausted at step {index} (pattern has {available} positions)")]
    PatternExhausted {
        /// Index that was requested.
        index: usize,
        /// Number of positions available.
        available: usize,
    },

    /// Command code is not recognised
    #[error("Unknown command: {code}")]
    UnknownCommand {
        /// The raw command code.
        code: i32,
    },

    /// Register/Align requested with no cameras
    #[error("No cams")]
    NoCameras,

    /// Reporting camera is not part of the job's expected set
    #[error("Camera {camera} is not expected by job {job}")]
    UnexpectedCamera {
        /// The reporting camera.
        camera: String,
        /// The job it reported for.
        job: String,
    },

    /// Camera driver reports it is not connected
    #[error("Camera not connected: {camera}")]
    NotConnected {
        /// The camera that failed to capture.
        camera: String,
    },

    /// Bounded queue is full
    #[error("Queue full for {key} (capacity {capacity})")]
    QueueRejected {
        /// The (connection/camera) key of the rejecting queue.
        key: String,
        /// Queue capacity.
        capacity: usize,
    },

    /// Agent has been shut down
    #[error("Agent closed: {key}")]
    AgentClosed {
        /// The (connection/camera) key of the closed agent.
        key: String,
    },

    /// An in-progress plan was removed by a reset while a capture was running
    #[error("Plan {key} was reset while in progress")]
    PlanDiscarded {
        /// The (connection/camera or connection/job) key of the plan.
        key: String,
    },

    /// The in-flight operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Raw command text could not be parsed
    #[error("Failed to parse command: {reason}")]
    Parse {
        /// The reason parsing failed.
        reason: String,
    },
}

/// Main error type for AlignKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Geometry error
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Alignment error
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a geometry error
    pub fn is_geometry_error(&self) -> bool {
        matches!(self, Error::Geometry(_))
    }

    /// Check if this is a coordinator/sequencer error
    pub fn is_alignment_error(&self) -> bool {
        matches!(self, Error::Alignment(_))
    }

    /// Check if a bounded queue rejected the request
    pub fn is_queue_rejected(&self) -> bool {
        matches!(self, Error::Alignment(AlignmentError::QueueRejected { .. }))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Alignment(AlignmentError::Cancelled))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
