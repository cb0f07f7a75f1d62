//! # AlignKit Coordinator
//!
//! The stateful half of AlignKit:
//! - [`Coordinator`]: calibration, registration and alignment state machine
//! - [`Agent`] / [`Router`]: one ordered, bounded command queue per (connection, camera)
//! - [`CaptureProvider`]: the camera capability the coordinator drives
//! - [`CommandPacket`] / [`CommandResult`] and the text command parser

pub mod agent;
pub mod cancel;
pub mod command;
pub mod coordinator;
pub mod parser;
pub mod router;
pub mod state;
pub mod vision;

pub use agent::{Agent, PendingResult, DEFAULT_QUEUE_CAPACITY};
pub use cancel::CancelToken;
pub use command::{
    new_job_id, AlignCommand, CommandPacket, CommandResult, CommandStatus, ResetScope,
};
pub use coordinator::{CalibrationResult, Coordinator};
pub use parser::{parse_command, parse_packet, ParsedCommand};
pub use router::Router;
pub use state::{
    AggregationPlan, AlignmentJob, CalibrationOutcome, CalibrationPlan, CalibrationStore,
    PerConnectionCalibration, RegistrationPlan,
};
pub use vision::{CaptureProvider, SimulatedCamera, VisionRegistry, CANNED_SEQUENCE};
