//! Text command parser
//!
//! PLCs send commands as comma-separated `key:value` pairs:
//!
//! ```text
//! command:2, robotpointx:100, robotpointy:200, robotpointu:0.5
//! ```
//!
//! Keys are case-insensitive. `command` is required; robot coordinates
//! default to zero and unknown keys are ignored.

use alignkit_core::{AlignmentError, DeviceName, Point3};

use crate::command::{new_job_id, AlignCommand, CommandPacket};

/// Fields carried by a text command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedCommand {
    pub command: AlignCommand,
    pub robot: Point3,
}

/// Parse the text form of a command
pub fn parse_command(raw: &str) -> Result<ParsedCommand, AlignmentError> {
    if raw.trim().is_empty() {
        return Err(AlignmentError::Parse {
            reason: "empty command".to_string(),
        });
    }

    let mut code: Option<i32> = None;
    let mut robot = Point3::ZERO;

    for part in raw.split(',') {
        let mut kv = part.split(':');
        let (Some(key), Some(value), None) = (kv.next(), kv.next(), kv.next()) else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "command" => {
                if let Ok(c) = value.parse::<i32>() {
                    code = Some(c);
                }
            }
            "robotpointx" => robot.x = value.parse().unwrap_or(robot.x),
            "robotpointy" => robot.y = value.parse().unwrap_or(robot.y),
            "robotpointu" => robot.u = value.parse().unwrap_or(robot.u),
            _ => {}
        }
    }

    let code = code.ok_or_else(|| AlignmentError::Parse {
        reason: "missing command".to_string(),
    })?;

    Ok(ParsedCommand {
        command: AlignCommand::from_code(code)?,
        robot,
    })
}

/// Parse a text command into a packet for `(connection, camera)`
///
/// A fresh job id is generated when `job_id` is `None`.
pub fn parse_packet(
    raw: &str,
    connection: impl Into<DeviceName>,
    camera: impl Into<DeviceName>,
    job_id: Option<&str>,
) -> Result<CommandPacket, AlignmentError> {
    let parsed = parse_command(raw)?;
    let job = job_id.map(str::to_string).unwrap_or_else(new_job_id);

    Ok(CommandPacket::new(connection, camera, parsed.command)
        .with_job(job)
        .with_robot(parsed.robot))
}
