//! Sorter configuration, stored as TOML.

use crate::copier::{DuplicateCheck, DEFAULT_CHECKPOINT_INTERVAL};
use crate::layout::DEFAULT_BACKUP_DIR_NAME;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SorterConfig {
    /// Send subfolders without a year prefix to an `Unknown` bucket instead
    /// of excluding them
    pub unknown_bucket_enabled: bool,
    /// Name of the backup root created under the destination
    pub backup_dir_name: String,
    /// Files between checkpoint log lines
    pub checkpoint_interval: usize,
    pub duplicate_check: DuplicateCheck,
    /// Write a run log into the backup root
    pub run_log: bool,
    /// Write a JSON report into the backup root
    pub write_report: bool,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            unknown_bucket_enabled: false,
            backup_dir_name: DEFAULT_BACKUP_DIR_NAME.to_string(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            duplicate_check: DuplicateCheck::Size,
            run_log: true,
            write_report: true,
        }
    }
}

impl SorterConfig {
    /// Load config from the user config directory, creating the default file
    /// if it does not exist yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            debug!("Config file not found, creating default");
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                warn!("Could not write default config to {}: {}", config_path.display(), e);
            }
            Ok(config)
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// `<config dir>/photo-year-backup/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| Error::Configuration {
            reason: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("photo-year-backup").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(Error::Configuration {
                reason: "checkpoint_interval must be greater than 0".to_string(),
            });
        }

        let name = self.backup_dir_name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::Configuration {
                reason: format!("Invalid backup directory name: {:?}", self.backup_dir_name),
            });
        }

        Ok(())
    }
}
