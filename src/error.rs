//! Custom error types for tarseal
//!
//! Fatal pipeline errors live in [`BackupError`]. Replication and
//! notification failures never abort a run, so they get their own types
//! that the orchestrator captures alongside a successful result.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backup::PipelineStage;

/// The main error type for tarseal operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors outside of a pipeline stage
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Archive creation failed
    #[error("Archive error: {message}{}", partial_suffix(.partial))]
    Archive {
        message: String,
        /// Incomplete plaintext archive left on disk, if any
        partial: Option<PathBuf>,
    },

    /// Extraction of an archive failed
    #[error("Extraction error for {}: {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    /// Sealing failed
    #[error("Encryption error: {message}{}", retained_suffix(.plaintext, .retained))]
    Encryption {
        plaintext: PathBuf,
        message: String,
        /// Whether the plaintext archive is still on disk
        retained: bool,
    },

    /// Unsealing failed
    #[error("Decryption error for {}: {message}", .sealed.display())]
    Decryption { sealed: PathBuf, message: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Another run holds the snapshot lock
    #[error("Snapshot state is locked by another run: {}", .0.display())]
    Locked(PathBuf),
}

fn partial_suffix(partial: &Option<PathBuf>) -> String {
    match partial {
        Some(path) => format!(" (incomplete archive remains at {})", path.display()),
        None => String::new(),
    }
}

fn retained_suffix(plaintext: &Path, retained: &bool) -> String {
    if *retained {
        format!(" (plaintext archive remains at {})", plaintext.display())
    } else {
        format!(" ({})", plaintext.display())
    }
}

impl BackupError {
    /// Create an archive error with no leftover file
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
            partial: None,
        }
    }

    /// Create an extraction error
    pub fn extraction(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Create an encryption error for a plaintext archive that is still on disk
    pub fn encryption(plaintext: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Encryption {
            plaintext: plaintext.into(),
            message: message.into(),
            retained: true,
        }
    }

    /// Create an encryption error for a plaintext archive that is not there
    pub fn missing_plaintext(plaintext: impl Into<PathBuf>) -> Self {
        Self::Encryption {
            plaintext: plaintext.into(),
            message: "plaintext archive does not exist".to_string(),
            retained: false,
        }
    }

    /// Create a decryption error
    pub fn decryption(sealed: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decryption {
            sealed: sealed.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error for backup artifacts
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The pipeline stage this error aborted, if it came from one
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Archive { .. } | Self::Locked(_) => Some(PipelineStage::Archiving),
            Self::Encryption { .. } => Some(PipelineStage::Sealing),
            Self::Decryption { .. } => Some(PipelineStage::Unsealing),
            Self::Extraction { .. } => Some(PipelineStage::Extracting),
            _ => None,
        }
    }

    /// Path of an artifact left behind in an intermediate state
    pub fn leftover(&self) -> Option<&PathBuf> {
        match self {
            Self::Archive { partial, .. } => partial.as_ref(),
            Self::Encryption {
                plaintext,
                retained: true,
                ..
            } => Some(plaintext),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for tarseal operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Replication of a sealed artifact failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Upload to '{destination}' failed: {message}")]
pub struct UploadError {
    pub destination: String,
    pub message: String,
}

impl UploadError {
    pub fn new(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message: message.into(),
        }
    }
}

/// Delivering the outcome notification failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification to '{recipient}' failed: {message}")]
pub struct NotificationError {
    pub recipient: String,
    pub message: String,
}

impl NotificationError {
    pub fn new(recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            message: message.into(),
        }
    }
}
