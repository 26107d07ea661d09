//! Replication through the `rclone` command

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::Replicator;
use crate::error::UploadError;

/// Runs `rclone copy <local> <remote>`
#[derive(Debug, Clone)]
pub struct RcloneReplicator {
    binary: String,
}

impl RcloneReplicator {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for RcloneReplicator {
    fn default() -> Self {
        Self::new("rclone")
    }
}

impl Replicator for RcloneReplicator {
    fn name(&self) -> &'static str {
        "rclone"
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), UploadError> {
        if remote.trim().is_empty() {
            return Err(UploadError::new(remote, "no remote destination configured"));
        }

        debug!(binary = %self.binary, local = %local.display(), remote, "running rclone copy");

        let output = Command::new(&self.binary)
            .arg("copy")
            .arg(local)
            .arg(remote)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| UploadError::new(remote, format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("{} exited with {}", self.binary, output.status),
                detail => format!("{} exited with {}: {}", self.binary, output.status, detail),
            };
            return Err(UploadError::new(remote, message));
        }

        Ok(())
    }
}
