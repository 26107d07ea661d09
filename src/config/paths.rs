//! Path management for tarseal
//!
//! ## Path Resolution Order
//!
//! 1. `TARSEAL_HOME` environment variable (if set)
//! 2. The platform config directory joined with `tarseal`
//!    (`~/.config/tarseal` on Linux, `~/Library/Application Support/tarseal`
//!    on macOS, `%APPDATA%\tarseal` on Windows)

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::archive::SNAPSHOT_FILE_NAME;
use crate::error::BackupError;

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "TARSEAL_HOME";

/// Manages all paths used by tarseal
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Base directory for configuration and, by default, backups
    base_dir: PathBuf,
    /// Backup directory override from settings
    backup_dir: Option<PathBuf>,
}

impl BackupPaths {
    /// Resolve the base directory from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = match std::env::var_os(HOME_ENV_VAR) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self {
            base_dir,
            backup_dir: None,
        })
    }

    /// Create BackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            backup_dir: None,
        }
    }

    /// Store backups somewhere other than `<base>/backups`
    pub fn with_backup_dir(mut self, backup_dir: Option<PathBuf>) -> Self {
        self.backup_dir = backup_dir;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding archives and the snapshot state
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("backups"))
    }

    /// Path of the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Path of the incremental snapshot state
    pub fn snapshot_file(&self) -> PathBuf {
        self.backup_dir().join(SNAPSHOT_FILE_NAME)
    }

    /// Path of the notification journal
    pub fn notification_journal(&self) -> PathBuf {
        self.base_dir.join("notifications.jsonl")
    }

    /// Ensure the base and backup directories exist
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create backup directory: {}", e)))?;

        Ok(())
    }

    /// Check if tarseal has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, BackupError> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| BackupError::Config("Could not determine home directory".into()))?;
    Ok(dirs.config_dir().join("tarseal"))
}
