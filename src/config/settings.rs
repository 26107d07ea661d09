//! User settings for tarseal
//!
//! Settings live in `config.json` under the base directory. A missing file is
//! not an error: every field falls back to its default, except that there is
//! no default passphrase.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::paths::BackupPaths;
use crate::crypto::KdfSettings;
use crate::error::BackupError;
use crate::storage::write_json_atomic;

/// How sealed archives are replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplicatorKind {
    /// `rclone copy` to a remote such as `s3:bucket/backups`
    #[default]
    Rclone,
    /// Copy into a local or mounted directory
    Directory,
    /// Replication disabled
    None,
}

impl fmt::Display for ReplicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rclone => write!(f, "rclone"),
            Self::Directory => write!(f, "directory"),
            Self::None => write!(f, "none"),
        }
    }
}

/// How outcome notifications are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Pipe to the system `mail` command
    Mail,
    /// Append to the notification journal
    #[default]
    Journal,
    /// Notifications disabled
    None,
}

impl fmt::Display for NotifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mail => write!(f, "mail"),
            Self::Journal => write!(f, "journal"),
            Self::None => write!(f, "none"),
        }
    }
}

/// User settings for tarseal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Store backups here instead of `<base>/backups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Replication target; empty disables replication
    #[serde(default)]
    pub remote_destination: String,

    #[serde(default)]
    pub replicator: ReplicatorKind,

    /// rclone executable
    #[serde(default = "default_rclone_binary")]
    pub rclone_binary: String,

    /// Who receives outcome notifications; empty disables mail
    #[serde(default)]
    pub notification_recipient: String,

    #[serde(default)]
    pub notifier: NotifierKind,

    /// Passphrase stored in plain text. Prefer `passphrase_file` or the
    /// `TARSEAL_PASSPHRASE` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// File whose first line is the passphrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_file: Option<PathBuf>,

    /// Argon2 costs for newly sealed archives
    #[serde(default)]
    pub kdf: KdfSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_rclone_binary() -> String {
    "rclone".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_dir: None,
            remote_destination: String::new(),
            replicator: ReplicatorKind::default(),
            rclone_binary: default_rclone_binary(),
            notification_recipient: String::new(),
            notifier: NotifierKind::default(),
            passphrase: None,
            passphrase_file: None,
            kdf: KdfSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    pub fn load_or_create(paths: &BackupPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                BackupError::Io(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            warn!(
                path = %settings_path.display(),
                "no configuration file; using defaults"
            );
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &BackupPaths) -> Result<(), BackupError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Whether sealed archives should be replicated
    pub fn replication_enabled(&self) -> bool {
        self.replicator != ReplicatorKind::None && !self.remote_destination.trim().is_empty()
    }
}
