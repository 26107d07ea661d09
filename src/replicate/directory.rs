//! Replication into a local or mounted directory

use std::fs;
use std::path::Path;

use super::Replicator;
use crate::error::UploadError;
use crate::storage::{remove_if_exists, with_suffix};

/// Copies into the directory named by the remote destination
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryReplicator;

impl Replicator for DirectoryReplicator {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), UploadError> {
        let file_name = local
            .file_name()
            .ok_or_else(|| UploadError::new(remote, format!("{} has no file name", local.display())))?;

        let target_dir = Path::new(remote);
        fs::create_dir_all(target_dir)
            .map_err(|e| UploadError::new(remote, format!("Failed to create directory: {}", e)))?;

        let target = target_dir.join(file_name);
        let temp = with_suffix(&target, ".part");

        if let Err(e) = fs::copy(local, &temp) {
            let _ = remove_if_exists(&temp);
            return Err(UploadError::new(remote, format!("Failed to copy {}: {}", local.display(), e)));
        }

        fs::rename(&temp, &target).map_err(|e| {
            let _ = remove_if_exists(&temp);
            UploadError::new(remote, format!("Failed to move copy into place: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copies_into_directory() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("backup_full_20250101_000000.tar.gz.enc");
        fs::write(&local, b"sealed bytes").unwrap();
        let remote = temp.path().join("mirror/nested");

        DirectoryReplicator
            .upload(&local, remote.to_str().unwrap())
            .unwrap();

        let copied = remote.join("backup_full_20250101_000000.tar.gz.enc");
        assert_eq!(fs::read(copied).unwrap(), b"sealed bytes");
        assert!(local.exists());
    }

    #[test]
    fn test_unreachable_destination_fails() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("a.enc");
        fs::write(&local, b"x").unwrap();

        // A regular file where a directory is expected
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let remote = blocker.join("sub");

        let err = DirectoryReplicator
            .upload(&local, remote.to_str().unwrap())
            .unwrap_err();
        assert_eq!(err.destination, remote.to_str().unwrap());
    }

    #[test]
    fn test_missing_local_file_fails() {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("mirror");

        let result = DirectoryReplicator.upload(&temp.path().join("absent.enc"), remote.to_str().unwrap());
        assert!(result.is_err());
        assert!(!remote.join("absent.enc.part").exists());
    }
}
