//! # AlignKit
//!
//! Vision-guided robot calibration and live position correction:
//! - Pixel ↔ robot affine calibration with SVD/QR least squares
//! - Rotation-center estimation (angle pairs or circle fit)
//! - Golden-position registration and live offset computation
//! - One ordered, bounded command queue per (connection, camera)
//!
//! ## Architecture
//!
//! AlignKit is organized as a workspace with multiple crates:
//!
//! 1. **alignkit-core** - Points, device names, geometry engine, errors, events
//! 2. **alignkit-settings** - Alignment parameters, calibration patterns, config providers
//! 3. **alignkit-coordinator** - Calibration state machine, agents, router, command parser
//! 4. **alignkit** - Facade and demo binary

pub use alignkit_core::{data, geometry};

pub use alignkit_core::{
    compute_sign_u, AffineTransform, AlignmentError, AlignmentEvent, AxisDir, CalibrationInfo,
    DeviceName, Error, EventBus, EventFilter, GeometryError, Point3, Result, RotDir,
    RotationMethod,
};

pub use alignkit_settings::{
    AlignmentConstants, AlignmentParams, ConfigFormat, ConfigProvider, FileConfig, MemoryConfig,
    SettingsError,
};

pub use alignkit_coordinator::{
    parse_command, AlignCommand, CancelToken, CaptureProvider, CommandPacket, CommandResult,
    CommandStatus, Coordinator, PendingResult, ResetScope, Router, SimulatedCamera,
    VisionRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
