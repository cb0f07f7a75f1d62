//! AlignKit Settings Crate
//!
//! Alignment parameters, calibration patterns, and the providers the
//! coordinator reads them through.

pub mod config;
pub mod error;
pub mod provider;

pub use config::{
    calibration_positions, calibration_steps, AlignmentConstants, AlignmentParams, ConfigFormat,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
pub use provider::{default_config_dir, ConfigProvider, FileConfig, MemoryConfig};
