//! Configuration providers
//!
//! The coordinator reads configuration through [`ConfigProvider`] so hosts can
//! keep it in memory, on disk, or anywhere else.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};

use crate::config::{AlignmentConstants, AlignmentParams, ConfigFormat};
use crate::error::{ConfigError, SettingsError, SettingsResult};

/// File name stem for [`AlignmentParams`]
pub const PARAMS_FILE_STEM: &str = "Params";
/// File name stem for [`AlignmentConstants`]
pub const CONSTANTS_FILE_STEM: &str = "Constants";

/// Source of alignment configuration
pub trait ConfigProvider: Send + Sync {
    /// Current parameters
    fn load_params(&self) -> SettingsResult<AlignmentParams>;

    /// Current calibration patterns
    fn load_constants(&self) -> SettingsResult<AlignmentConstants>;

    /// Replace the parameters
    fn save_params(&self, params: &AlignmentParams) -> SettingsResult<()>;

    /// Replace the calibration patterns
    fn save_constants(&self, constants: &AlignmentConstants) -> SettingsResult<()>;
}

/// Configuration held in memory
#[derive(Debug, Default)]
pub struct MemoryConfig {
    params: RwLock<AlignmentParams>,
    constants: RwLock<AlignmentConstants>,
}

impl MemoryConfig {
    /// Create a provider holding the given documents
    pub fn new(params: AlignmentParams, constants: AlignmentConstants) -> Self {
        Self {
            params: RwLock::new(params),
            constants: RwLock::new(constants),
        }
    }

    /// Default patterns with the given parameters
    pub fn with_params(params: AlignmentParams) -> Self {
        Self::new(params, AlignmentConstants::default())
    }
}

impl ConfigProvider for MemoryConfig {
    fn load_params(&self) -> SettingsResult<AlignmentParams> {
        Ok(self.params.read().clone())
    }

    fn load_constants(&self) -> SettingsResult<AlignmentConstants> {
        Ok(self.constants.read().clone())
    }

    fn save_params(&self, params: &AlignmentParams) -> SettingsResult<()> {
        params.validate()?;
        *self.params.write() = params.clone();
        Ok(())
    }

    fn save_constants(&self, constants: &AlignmentConstants) -> SettingsResult<()> {
        constants.validate()?;
        *self.constants.write() = constants.clone();
        Ok(())
    }
}

/// Configuration stored as `Params.<ext>` and `Constants.<ext>` in a directory
///
/// Missing files load as defaults. Documents are validated on load and save.
#[derive(Debug, Clone)]
pub struct FileConfig {
    dir: PathBuf,
    format: ConfigFormat,
}

impl FileConfig {
    /// Use `dir` with the given format
    pub fn new(dir: impl Into<PathBuf>, format: ConfigFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// `<config dir>/alignkit/AlignmentData`, as JSON
    pub fn default_location() -> SettingsResult<Self> {
        Ok(Self::new(default_config_dir()?, ConfigFormat::Json))
    }

    /// Directory holding the documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the parameters document
    pub fn params_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", PARAMS_FILE_STEM, self.format.extension()))
    }

    /// Path of the constants document
    pub fn constants_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", CONSTANTS_FILE_STEM, self.format.extension()))
    }

    fn ensure_dir(&self) -> SettingsResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SettingsError::ConfigDirectory(format!("{}: {}", self.dir.display(), e))
        })
    }
}

impl ConfigProvider for FileConfig {
    fn load_params(&self) -> SettingsResult<AlignmentParams> {
        let path = self.params_path();
        if !path.exists() {
            tracing::debug!("{} not found, using default parameters", path.display());
            return Ok(AlignmentParams::default());
        }
        AlignmentParams::load_from_file(&path)
    }

    fn load_constants(&self) -> SettingsResult<AlignmentConstants> {
        let path = self.constants_path();
        if !path.exists() {
            tracing::debug!("{} not found, using default patterns", path.display());
            return Ok(AlignmentConstants::default());
        }
        AlignmentConstants::load_from_file(&path)
    }

    fn save_params(&self, params: &AlignmentParams) -> SettingsResult<()> {
        self.ensure_dir()?;
        let path = self.params_path();
        params.save_to_file(&path)?;
        tracing::info!("Saved alignment parameters to {}", path.display());
        Ok(())
    }

    fn save_constants(&self, constants: &AlignmentConstants) -> SettingsResult<()> {
        self.ensure_dir()?;
        let path = self.constants_path();
        constants.save_to_file(&path)?;
        tracing::info!("Saved calibration patterns to {}", path.display());
        Ok(())
    }
}

/// Platform configuration directory for alignment data
pub fn default_config_dir() -> SettingsResult<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| {
        ConfigError::UnsupportedPlatform("no configuration directory".to_string())
    })?;
    Ok(base.join("alignkit").join("AlignmentData"))
}
