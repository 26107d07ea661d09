//! Advisory lock on the snapshot state
//!
//! Two incremental runs against the same snapshot state would race on
//! reading and rewriting the baseline. The lock is taken for the whole
//! pipeline and released when the guard drops. Acquisition does not wait.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BackupError, BackupResult};

use super::file_io::with_suffix;

/// Exclusive lock guarding one snapshot state file
pub struct SnapshotLock {
    lock_path: PathBuf,
    #[allow(dead_code)]
    lock_file: File,
}

impl SnapshotLock {
    /// Acquire the lock that guards `snapshot_path`.
    ///
    /// Fails with [`BackupError::Locked`] if another process holds it.
    pub fn acquire(snapshot_path: &Path) -> BackupResult<Self> {
        let lock_path = with_suffix(snapshot_path, ".lock");

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackupError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        match Self::try_acquire_exclusive(&lock_path) {
            Ok(file) => {
                debug!(lock = %lock_path.display(), "snapshot lock acquired");
                Ok(Self {
                    lock_path,
                    lock_file: file,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(BackupError::Locked(lock_path)),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to lock {}: {}",
                lock_path.display(),
                e
            ))),
        }
    }

    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    /// Get the lock file path
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
