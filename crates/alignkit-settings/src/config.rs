//! Alignment configuration
//!
//! Two documents describe how a calibration is run:
//! - [`AlignmentParams`]: per-axis step scale, offset limits and trim, axis
//!   conventions and the rotation-center method
//! - [`AlignmentConstants`]: the unit position pattern visited during
//!   calibration and the relative moves between its positions
//!
//! Both are stored as JSON or TOML; the format follows the file extension.

use alignkit_core::geometry::RotationMethod;
use alignkit_core::{AxisDir, Point3, RotDir};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Json,
    Toml,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(ConfigFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }
}

/// Tunable alignment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    /// Step size per axis; pattern entries are scaled by it componentwise
    pub calib_move: Point3,
    /// Per-axis clamp for computed offsets; non-positive means unclamped
    pub offset_limit: Point3,
    /// Constant added to computed offsets
    pub offset_trim: Point3,
    /// Image direction of machine +X
    pub x_positive: AxisDir,
    /// Image direction of machine +Y
    pub y_positive: AxisDir,
    /// Positive rotation direction of U
    pub u_rotation: RotDir,
    /// Rotation-center estimator
    pub rotation_method: RotationMethod,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            calib_move: Point3::ZERO,
            offset_limit: Point3::ZERO,
            offset_trim: Point3::ZERO,
            x_positive: AxisDir::Right,
            y_positive: AxisDir::Down,
            u_rotation: RotDir::Ccw,
            rotation_method: RotationMethod::AnglePair,
        }
    }
}

impl AlignmentParams {
    /// Reject non-finite values
    ///
    /// Axis orthogonality is checked when a calibration runs, so an invalid
    /// axis pair still loads and is reported against that calibration.
    pub fn validate(&self) -> SettingsResult<()> {
        check_finite("calib_move", &self.calib_move)?;
        check_finite("offset_limit", &self.offset_limit)?;
        check_finite("offset_trim", &self.offset_trim)?;
        Ok(())
    }

    /// Load from a JSON or TOML file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let params: Self = read_document(path)?;
        params.validate()?;
        Ok(params)
    }

    /// Save to a JSON or TOML file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        write_document(path, self)
    }
}

/// Calibration patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConstants {
    /// Unit positions visited in order: a 3×3 grid, back to center, then rotation probes
    pub calib_pos_matrix: Vec<Point3>,
    /// Unit relative move taken after each capture
    pub calib_move_matrix: Vec<Point3>,
}

impl Default for AlignmentConstants {
    fn default() -> Self {
        let p = Point3::new;
        Self {
            calib_pos_matrix: vec![
                p(0.0, 0.0, 0.0),
                p(-1.0, 0.0, 0.0),
                p(-1.0, -1.0, 0.0),
                p(0.0, -1.0, 0.0),
                p(1.0, -1.0, 0.0),
                p(1.0, 0.0, 0.0),
                p(1.0, 1.0, 0.0),
                p(0.0, 1.0, 0.0),
                p(-1.0, 1.0, 0.0),
                p(0.0, 0.0, 0.0),
                p(0.0, 0.0, -1.0),
                p(0.0, 0.0, 1.0),
                p(0.0, 0.0, 0.0),
            ],
            calib_move_matrix: vec![
                p(-1.0, 0.0, 0.0),
                p(0.0, -1.0, 0.0),
                p(1.0, 0.0, 0.0),
                p(1.0, 0.0, 0.0),
                p(0.0, 1.0, 0.0),
                p(0.0, 1.0, 0.0),
                p(-1.0, 0.0, 0.0),
                p(1.0, -1.0, 0.0),
                p(0.0, 0.0, -1.0),
                p(0.0, 0.0, 2.0),
                p(0.0, 0.0, -1.0),
                p(0.0, 0.0, 0.0),
            ],
        }
    }
}

impl AlignmentConstants {
    /// Both patterns must be non-empty and finite
    pub fn validate(&self) -> SettingsResult<()> {
        if self.calib_pos_matrix.is_empty() {
            return Err(SettingsError::invalid("calib_pos_matrix", "must not be empty"));
        }
        if self.calib_move_matrix.is_empty() {
            return Err(SettingsError::invalid("calib_move_matrix", "must not be empty"));
        }
        for (i, p) in self.calib_pos_matrix.iter().enumerate() {
            check_finite(&format!("calib_pos_matrix[{}]", i), p)?;
        }
        for (i, p) in self.calib_move_matrix.iter().enumerate() {
            check_finite(&format!("calib_move_matrix[{}]", i), p)?;
        }
        Ok(())
    }

    /// Load from a JSON or TOML file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let constants: Self = read_document(path)?;
        constants.validate()?;
        Ok(constants)
    }

    /// Save to a JSON or TOML file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        write_document(path, self)
    }
}

/// Positions to visit: each pattern entry scaled by `calib_move`
pub fn calibration_positions(params: &AlignmentParams, constants: &AlignmentConstants) -> Vec<Point3> {
    constants
        .calib_pos_matrix
        .iter()
        .map(|p| p.scale(&params.calib_move))
        .collect()
}

/// Relative moves between captures: each move entry scaled by `calib_move`
pub fn calibration_steps(params: &AlignmentParams, constants: &AlignmentConstants) -> Vec<Point3> {
    constants
        .calib_move_matrix
        .iter()
        .map(|p| p.scale(&params.calib_move))
        .collect()
}

fn check_finite(key: &str, p: &Point3) -> SettingsResult<()> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::ValueOutOfRange {
            key: key.to_string(),
            value: p.to_string(),
        }
        .into())
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> SettingsResult<T> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

    let value = match format {
        ConfigFormat::Json => serde_json::from_str(&content)?,
        ConfigFormat::Toml => toml::from_str(&content)?,
    };
    Ok(value)
}

fn write_document<T: Serialize>(path: &Path, value: &T) -> SettingsResult<()> {
    let format = ConfigFormat::from_path(path)?;
    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(value)?,
        ConfigFormat::Toml => toml::to_string_pretty(value)?,
    };

    std::fs::write(path, content)
        .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
