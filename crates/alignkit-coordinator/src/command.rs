//! Commands and their results
//!
//! A [`CommandPacket`] is what a PLC or host sends for one (connection,
//! camera); a [`CommandResult`] is what comes back.

use alignkit_core::{AlignmentError, DeviceName, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a reset clears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResetScope {
    /// In-progress plans only
    #[default]
    ProgressOnly,
    /// In-progress plans and the connection's committed calibration
    AllCalibration,
}

/// Command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlignCommand {
    /// Capture one calibration point
    Calibrate,
    /// Record golden positions
    Register,
    /// Measure the live offset against the golden position
    Align,
    /// Discard progress (and optionally calibration)
    Reset(ResetScope),
}

impl AlignCommand {
    /// Decode a wire command code
    ///
    /// `7` decodes to a progress-only reset.
    pub fn from_code(code: i32) -> Result<Self, AlignmentError> {
        match code {
            0 => Ok(AlignCommand::Calibrate),
            1 => Ok(AlignCommand::Register),
            2 => Ok(AlignCommand::Align),
            7 => Ok(AlignCommand::Reset(ResetScope::ProgressOnly)),
            _ => Err(AlignmentError::UnknownCommand { code }),
        }
    }

    /// Wire command code
    pub fn code(&self) -> i32 {
        match self {
            AlignCommand::Calibrate => 0,
            AlignCommand::Register => 1,
            AlignCommand::Align => 2,
            AlignCommand::Reset(_) => 7,
        }
    }
}

impl fmt::Display for AlignCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignCommand::Calibrate => write!(f, "Calibrate"),
            AlignCommand::Register => write!(f, "Register"),
            AlignCommand::Align => write!(f, "Align"),
            AlignCommand::Reset(ResetScope::ProgressOnly) => write!(f, "Reset"),
            AlignCommand::Reset(ResetScope::AllCalibration) => write!(f, "Reset(all)"),
        }
    }
}

/// Generate a job id (32 lowercase hex digits)
pub fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One command for one (connection, camera)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPacket {
    /// Connection (robot/PLC link) the command belongs to
    pub connection: DeviceName,
    /// Reporting camera; also selects the agent that runs the command
    pub camera: DeviceName,
    /// Cameras expected to report for a Register/Align job
    pub cameras: Vec<DeviceName>,
    /// What to do
    pub command: AlignCommand,
    /// Job id; Register/Align reports with the same id are aggregated
    pub job_id: String,
    /// Robot pose at the time of the command
    pub robot: Point3,
}

impl CommandPacket {
    /// Create a packet with a fresh job id and zero robot pose
    pub fn new(
        connection: impl Into<DeviceName>,
        camera: impl Into<DeviceName>,
        command: AlignCommand,
    ) -> Self {
        Self {
            connection: connection.into(),
            camera: camera.into(),
            cameras: Vec::new(),
            command,
            job_id: new_job_id(),
            robot: Point3::ZERO,
        }
    }

    /// Use a caller-chosen job id
    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Attach the robot pose
    pub fn with_robot(mut self, robot: Point3) -> Self {
        self.robot = robot;
        self
    }

    /// Set the cameras a Register/Align job waits for
    pub fn with_cameras<I, N>(mut self, cameras: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<DeviceName>,
    {
        self.cameras = cameras.into_iter().map(Into::into).collect();
        self
    }

    /// Cameras a Register/Align job waits for, first-seen order, no duplicates
    ///
    /// Falls back to the reporting camera when no list was given.
    pub fn expected_cameras(&self) -> Vec<DeviceName> {
        let source: Vec<&DeviceName> = if self.cameras.is_empty() {
            vec![&self.camera]
        } else {
            self.cameras.iter().collect()
        };

        let mut out: Vec<DeviceName> = Vec::with_capacity(source.len());
        for cam in source {
            if !cam.is_empty() && !out.contains(cam) {
                out.push(cam.clone());
            }
        }
        out
    }

    /// Cameras this packet should capture for a Register/Align job
    ///
    /// When both a reporting camera and an expected list are present only the
    /// reporting camera captures; other cameras report through their own packets.
    /// A reporting camera outside the expected list is rejected.
    pub fn cameras_to_capture(&self) -> Result<Vec<DeviceName>, AlignmentError> {
        let expected = self.expected_cameras();
        if self.camera.is_empty() || self.cameras.is_empty() {
            return Ok(expected);
        }
        if !expected.contains(&self.camera) {
            return Err(AlignmentError::UnexpectedCamera {
                camera: self.camera.to_string(),
                job: self.job_id.clone(),
            });
        }
        Ok(vec![self.camera.clone()])
    }

    /// `connection/camera` label used for logs and agent keys
    pub fn key_label(&self) -> String {
        format!("{}/{}", self.connection, self.camera)
    }
}

/// Outcome category of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum CommandStatus {
    /// The bounded queue refused the command
    QueueRejected,
    /// Finished in one step
    Ok,
    /// More captures are needed
    InProgress,
    /// A multi-step command finished
    Completed,
    /// The command failed
    Failed,
}

impl CommandStatus {
    /// Wire status code
    pub fn code(self) -> i32 {
        match self {
            CommandStatus::QueueRejected => -1,
            CommandStatus::Ok => 0,
            CommandStatus::InProgress => 1,
            CommandStatus::Completed => 2,
            CommandStatus::Failed => 3,
        }
    }
}

impl From<CommandStatus> for i32 {
    fn from(status: CommandStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for CommandStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(CommandStatus::QueueRejected),
            0 => Ok(CommandStatus::Ok),
            1 => Ok(CommandStatus::InProgress),
            2 => Ok(CommandStatus::Completed),
            3 => Ok(CommandStatus::Failed),
            other => Err(format!("unknown status code {}", other)),
        }
    }
}

/// Result of one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub status: CommandStatus,
    pub message: String,
    pub job_id: String,
    /// Captures collected so far (calibration points or reporting cameras)
    pub completed: usize,
    /// Captures needed
    pub required: usize,
    /// Latest captured pixel
    pub pixel: Point3,
    /// Latest real-space position
    pub real: Point3,
    /// `real − realGolden`
    pub offset: Point3,
    /// Calibration fit error
    pub rmse: f64,
    /// Relative move to apply before the next Calibrate
    pub next_relative_move: Point3,
}

impl CommandResult {
    fn with_status(status: CommandStatus, job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: !matches!(status, CommandStatus::Failed | CommandStatus::QueueRejected),
            status,
            message: message.into(),
            job_id: job_id.into(),
            completed: 0,
            required: 0,
            pixel: Point3::ZERO,
            real: Point3::ZERO,
            offset: Point3::ZERO,
            rmse: 0.0,
            next_relative_move: Point3::ZERO,
        }
    }

    /// Single-step success
    pub fn ok(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::Ok, job_id, message)
    }

    /// Partial progress
    pub fn in_progress(
        job_id: impl Into<String>,
        message: impl Into<String>,
        completed: usize,
        required: usize,
    ) -> Self {
        Self {
            completed,
            required,
            ..Self::with_status(CommandStatus::InProgress, job_id, message)
        }
    }

    /// Multi-step completion
    pub fn completed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::Completed, job_id, message)
    }

    /// Failure with a reason
    pub fn failed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::Failed, job_id, reason)
    }

    /// Refused by a full queue
    pub fn queue_rejected(job_id: impl Into<String>) -> Self {
        Self::with_status(CommandStatus::QueueRejected, job_id, "Queue full")
    }

    /// Wire status code
    pub fn status_code(&self) -> i32 {
        self.status.code()
    }
}
