//! Best-effort replication of sealed archives
//!
//! A replicator makes one attempt to copy a sealed archive to the configured
//! remote destination. Failures are returned as [`UploadError`] and never
//! undo local work.

mod directory;
mod rclone;

use std::path::Path;

use crate::config::{ReplicatorKind, Settings};
use crate::error::UploadError;

pub use directory::DirectoryReplicator;
pub use rclone::RcloneReplicator;

/// Copies a local file to a remote destination
pub trait Replicator {
    /// Short name used in logs and notifications
    fn name(&self) -> &'static str;

    /// Copy `local` to `remote`. A single attempt with no retry.
    fn upload(&self, local: &Path, remote: &str) -> Result<(), UploadError>;

    /// Whether this replicator actually sends anything
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Replication disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReplicator;

impl Replicator for NoopReplicator {
    fn name(&self) -> &'static str {
        "none"
    }

    fn upload(&self, _local: &Path, _remote: &str) -> Result<(), UploadError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the replicator selected in `settings`
pub fn replicator_from_settings(settings: &Settings) -> Box<dyn Replicator> {
    match settings.replicator {
        ReplicatorKind::Rclone => Box::new(RcloneReplicator::new(&settings.rclone_binary)),
        ReplicatorKind::Directory => Box::new(DirectoryReplicator),
        ReplicatorKind::None => Box::new(NoopReplicator),
    }
}
