//! Pipeline stages and outcomes
//!
//! These types describe what a backup, restore or verification run did.
//! Fatal failures are reported as [`BackupError`](crate::error::BackupError);
//! everything else ends up in one of the outcome structs here.

use std::fmt;
use std::path::PathBuf;

use crate::archive::{ArchiveArtifact, BackupKind};
use crate::error::{NotificationError, UploadError};

/// Stages of the backup and restore pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    Archiving,
    Sealing,
    Replicating,
    Notifying,
    Done,
    Failed,
    DetectingSealed,
    Unsealing,
    Extracting,
    ListingEntries,
    CleaningUp,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Archiving => "archiving",
            Self::Sealing => "sealing",
            Self::Replicating => "replicating",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::DetectingSealed => "detecting sealed",
            Self::Unsealing => "unsealing",
            Self::Extracting => "extracting",
            Self::ListingEntries => "listing entries",
            Self::CleaningUp => "cleaning up",
        };
        write!(f, "{}", name)
    }
}

/// An archive that has been sealed; its plaintext no longer exists
#[derive(Debug, Clone)]
pub struct SealedArtifact {
    pub path: PathBuf,
    pub origin: ArchiveArtifact,
    pub algorithm: &'static str,
}

/// What happened when the sealed archive was replicated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStatus {
    Uploaded { destination: String },
    /// No destination configured or replication disabled
    Skipped,
    Failed(UploadError),
}

impl ReplicationStatus {
    pub fn error(&self) -> Option<&UploadError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploaded { destination } => write!(f, "uploaded to {}", destination),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(e) => write!(f, "FAILED ({})", e.message),
        }
    }
}

/// What happened when the outcome notification was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent,
    Skipped,
    Failed(NotificationError),
}

impl NotificationStatus {
    pub fn error(&self) -> Option<&NotificationError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed(e) => write!(f, "FAILED ({})", e.message),
        }
    }
}

/// Result of a backup run that got past sealing
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub kind: BackupKind,
    pub sealed: SealedArtifact,
    /// Stages visited, in order
    pub stages: Vec<PipelineStage>,
    pub replication: ReplicationStatus,
    pub notification: NotificationStatus,
}

impl BackupOutcome {
    /// A backup succeeds once sealing completes
    pub fn is_success(&self) -> bool {
        self.stages.contains(&PipelineStage::Done)
    }

    /// Whether replication or notification reported an error
    pub fn has_warnings(&self) -> bool {
        self.replication.error().is_some() || self.notification.error().is_some()
    }

    /// Get a summary of the run
    pub fn summary(&self) -> String {
        format!(
            "{} backup sealed at {} ({} files, {} directories); replication {}",
            self.kind,
            self.sealed.path.display(),
            self.sealed.origin.files,
            self.sealed.origin.directories,
            self.replication
        )
    }
}

/// Result of a restore
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub artifact: PathBuf,
    pub destination: PathBuf,
    pub was_sealed: bool,
    /// Archive entries unpacked
    pub entries: usize,
    pub stages: Vec<PipelineStage>,
}

impl RestoreOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Restored {} entries from {}{} into {}",
            self.entries,
            self.artifact.display(),
            if self.was_sealed { " (sealed)" } else { "" },
            self.destination.display()
        )
    }
}

/// Result of checking that an artifact can be unsealed and read
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub artifact: PathBuf,
    /// Kind from the file name, if it follows the naming scheme
    pub kind: Option<BackupKind>,
    pub sealed: bool,
    pub files: usize,
    pub directories: usize,
}

impl VerificationReport {
    pub fn summary(&self) -> String {
        let kind = match self.kind {
            Some(kind) => kind.to_string(),
            None => "Unknown".to_string(),
        };
        format!(
            "{} backup, {}: {} files, {} directories readable",
            kind,
            if self.sealed { "sealed" } else { "plaintext" },
            self.files,
            self.directories
        )
    }
}
