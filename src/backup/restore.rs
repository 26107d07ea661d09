//! Transient plaintext used while restoring or verifying sealed archives

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{remove_if_exists, with_suffix};

/// Plaintext archive materialized from a sealed artifact.
///
/// The file (and any unsealing temp file next to it) is removed when the
/// buffer is dropped, whichever way the restore ends.
#[derive(Debug)]
pub struct TransientBuffer {
    path: PathBuf,
}

impl TransientBuffer {
    /// Reserve a uniquely named buffer inside `dir`
    pub fn new_in(dir: &Path) -> Self {
        let path = dir.join(format!(".restore-{}.tar.gz", Uuid::new_v4()));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientBuffer {
    fn drop(&mut self) {
        for path in [self.path.clone(), with_suffix(&self.path, ".tmp")] {
            if let Err(e) = remove_if_exists(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove transient plaintext");
            }
        }
        debug!(path = %self.path.display(), "transient plaintext removed");
    }
}
