//! Full and incremental tar.gz archives
//!
//! Entries are stored relative to the source root. Symlinks are stored as
//! symlinks, never followed. If the backup directory lies inside the source
//! tree it is skipped so archives never contain earlier archives.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::crypto::Sealer;
use crate::error::{BackupError, BackupResult};

use super::naming::{archive_file_name, BackupKind};
use super::snapshot::{snapshot_key, EntryKind, FileRecord, SnapshotState, SnapshotStore};

/// A freshly written plaintext archive
#[derive(Debug, Clone)]
pub struct ArchiveArtifact {
    /// Canonical source root
    pub source: PathBuf,
    pub created_at: NaiveDateTime,
    pub kind: BackupKind,
    /// Location of the plaintext archive
    pub path: PathBuf,
    /// Regular files and symlinks stored
    pub files: usize,
    /// Directory entries stored
    pub directories: usize,
}

/// An entry read back from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
}

/// Creates and extracts archives in one backup directory
#[derive(Debug, Clone)]
pub struct Archiver {
    backup_dir: PathBuf,
}

impl Archiver {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Archive the whole of `source`
    pub fn create_full(&self, source: &Path) -> BackupResult<ArchiveArtifact> {
        self.create_full_at(source, Local::now().naive_local())
    }

    /// Archive the whole of `source`, naming the archive after `when`
    pub fn create_full_at(&self, source: &Path, when: NaiveDateTime) -> BackupResult<ArchiveArtifact> {
        let (artifact, _) = self.write_archive(source, BackupKind::Full, when, None)?;
        Ok(artifact)
    }

    /// Archive entries of `source` changed since the state at `snapshot_path`,
    /// then record the new baseline there.
    ///
    /// Without a usable state the archive holds the complete tree.
    pub fn create_incremental(&self, source: &Path, snapshot_path: &Path) -> BackupResult<ArchiveArtifact> {
        self.create_incremental_at(source, snapshot_path, Local::now().naive_local())
    }

    /// Incremental archive named after `when`
    pub fn create_incremental_at(
        &self,
        source: &Path,
        snapshot_path: &Path,
        when: NaiveDateTime,
    ) -> BackupResult<ArchiveArtifact> {
        let store = SnapshotStore::new(snapshot_path);
        let canonical = canonical_source(source)?;
        let baseline = store.load_for(&canonical);

        if baseline.is_none() {
            info!(source = %canonical.display(), "no snapshot state; incremental will contain the full tree");
        }

        let (artifact, state) =
            self.write_archive(&canonical, BackupKind::Incremental, when, baseline.as_ref())?;

        if let Err(e) = store.save(&state) {
            // An archive without a recorded baseline would be misleading
            let partial = match fs::remove_file(&artifact.path) {
                Ok(()) => None,
                Err(_) => Some(artifact.path.clone()),
            };
            return Err(BackupError::Archive {
                message: format!("Failed to record snapshot state: {}", e),
                partial,
            });
        }

        Ok(artifact)
    }

    fn write_archive(
        &self,
        source: &Path,
        kind: BackupKind,
        when: NaiveDateTime,
        baseline: Option<&SnapshotState>,
    ) -> BackupResult<(ArchiveArtifact, SnapshotState)> {
        let source = canonical_source(source)?;

        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            BackupError::archive(format!(
                "Failed to create backup directory {}: {}",
                self.backup_dir.display(),
                e
            ))
        })?;
        let backup_dir = fs::canonicalize(&self.backup_dir).map_err(|e| {
            BackupError::archive(format!("Failed to resolve backup directory: {}", e))
        })?;

        let path = backup_dir.join(archive_file_name(kind, when));
        let sealed = Sealer::sealed_path(&path);
        if path.exists() || sealed.exists() {
            return Err(BackupError::archive(format!(
                "{} already exists; refusing to overwrite an existing backup",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| BackupError::archive(format!("Failed to create {}: {}", path.display(), e)))?;

        debug!(archive = %path.display(), kind = %kind, "writing archive");

        match fill_archive(file, &source, &backup_dir, baseline) {
            Ok((state, files, directories)) => {
                info!(archive = %path.display(), files, directories, "archive written");
                let artifact = ArchiveArtifact {
                    source,
                    created_at: when,
                    kind,
                    path,
                    files,
                    directories,
                };
                Ok((artifact, state))
            }
            Err(message) => {
                let partial = match fs::remove_file(&path) {
                    Ok(()) => None,
                    Err(_) => Some(path),
                };
                Err(BackupError::Archive { message, partial })
            }
        }
    }

    /// Unpack every entry of `archive` into `destination`, creating it if
    /// needed. Returns the number of entries unpacked.
    pub fn extract(&self, archive: &Path, destination: &Path) -> BackupResult<usize> {
        fs::create_dir_all(destination).map_err(|e| {
            BackupError::extraction(
                archive,
                format!("Cannot create destination {}: {}", destination.display(), e),
            )
        })?;

        let file = File::open(archive)
            .map_err(|e| BackupError::extraction(archive, format!("Failed to open: {}", e)))?;

        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        tar.set_preserve_permissions(true);
        tar.set_overwrite(true);

        let mut count = 0;
        {
            // Directory modes are applied last, deepest first, so a read-only
            // directory does not block writing its own children
            let mut directories = Vec::new();
            for entry in tar
                .entries()
                .map_err(|e| BackupError::extraction(archive, e.to_string()))?
            {
                let mut entry =
                    entry.map_err(|e| BackupError::extraction(archive, e.to_string()))?;
                if entry.header().entry_type().is_dir() {
                    directories.push(entry);
                    continue;
                }
                unpack_entry(&mut entry, archive, destination)?;
                count += 1;
            }

            directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
            for mut dir in directories {
                unpack_entry(&mut dir, archive, destination)?;
                count += 1;
            }
        }

        verify_trailer(tar.into_inner()).map_err(|e| BackupError::extraction(archive, e))?;

        info!(archive = %archive.display(), destination = %destination.display(), entries = count, "archive extracted");
        Ok(count)
    }

    /// Read the entries of a plaintext archive without unpacking it
    pub fn list_entries(&self, archive: &Path) -> BackupResult<Vec<ArchivedEntry>> {
        let file = File::open(archive)
            .map_err(|e| BackupError::extraction(archive, format!("Failed to open: {}", e)))?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

        let mut entries = Vec::new();
        for entry in tar
            .entries()
            .map_err(|e| BackupError::extraction(archive, e.to_string()))?
        {
            let entry = entry.map_err(|e| BackupError::extraction(archive, e.to_string()))?;
            let header_type = entry.header().entry_type();
            let kind = if header_type.is_dir() {
                EntryKind::Directory
            } else if header_type.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };
            let path = entry
                .path()
                .map_err(|e| BackupError::extraction(archive, e.to_string()))?
                .into_owned();
            entries.push(ArchivedEntry {
                path,
                kind,
                size: entry.size(),
            });
        }

        verify_trailer(tar.into_inner()).map_err(|e| BackupError::extraction(archive, e))?;
        Ok(entries)
    }
}

fn unpack_entry<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    archive: &Path,
    destination: &Path,
) -> BackupResult<()> {
    entry.unpack_in(destination).map(|_| ()).map_err(|e| {
        BackupError::extraction(archive, format!("Failed to unpack entry: {}", e))
    })
}

fn canonical_source(source: &Path) -> BackupResult<PathBuf> {
    let canonical = fs::canonicalize(source).map_err(|e| {
        BackupError::archive(format!("Cannot read source {}: {}", source.display(), e))
    })?;
    if !canonical.is_dir() {
        return Err(BackupError::archive(format!(
            "Source {} is not a directory",
            source.display()
        )));
    }
    Ok(canonical)
}

/// Write the tar stream; returns the new baseline and file/dir counts
fn fill_archive(
    file: File,
    source: &Path,
    backup_dir: &Path,
    baseline: Option<&SnapshotState>,
) -> Result<(SnapshotState, usize, usize), String> {
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut state = SnapshotState::new(source);
    let mut files = 0;
    let mut directories = 0;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != backup_dir);

    for entry in walker {
        let entry = entry.map_err(|e| format!("Failed to read source tree: {}", e))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| format!("Unexpected path {}: {}", entry.path().display(), e))?;
        let metadata = entry
            .metadata()
            .map_err(|e| format!("Failed to stat {}: {}", entry.path().display(), e))?;

        let Some(record) = FileRecord::from_metadata(&metadata) else {
            debug!(path = %entry.path().display(), "skipping special file");
            continue;
        };

        let key = snapshot_key(relative);
        let changed = baseline.map_or(true, |b| b.is_changed(&key, &record));
        let is_dir = record.kind == EntryKind::Directory;
        state.record(key, record);

        // Directories always go in so extraction recreates the tree shape
        if is_dir || changed {
            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(|e| format!("Failed to archive {}: {}", entry.path().display(), e))?;
            if is_dir {
                directories += 1;
            } else {
                files += 1;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| format!("Failed to finish tar stream: {}", e))?;
    let writer = encoder
        .finish()
        .map_err(|e| format!("Failed to finish compression: {}", e))?;
    let file = writer
        .into_inner()
        .map_err(|e| format!("Failed to flush archive: {}", e.error()))?;
    file.sync_all()
        .map_err(|e| format!("Failed to sync archive: {}", e))?;

    Ok((state, files, directories))
}

/// Drain the rest of the gzip stream so its CRC and length are checked
fn verify_trailer<R: Read>(mut reader: R) -> Result<(), String> {
    io::copy(&mut reader, &mut io::sink())
        .map(|_| ())
        .map_err(|e| format!("Corrupt archive: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use crate::archive::snapshot::SNAPSHOT_FILE_NAME;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        backups: PathBuf,
        restore: PathBuf,
    }

    fn create_test_fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        fs::create_dir_all(source.join("docs/empty")).unwrap();
        fs::write(source.join("docs/report.txt"), b"quarterly numbers").unwrap();
        fs::write(source.join("notes.txt"), b"remember the milk").unwrap();

        Fixture {
            backups: temp.path().join("backups"),
            restore: temp.path().join("restore"),
            source,
            _temp: temp,
        }
    }

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap()
    }

    fn file_paths(entries: &[ArchivedEntry]) -> Vec<String> {
        entries
            .iter()
            .filter(|e| e.kind != EntryKind::Directory)
            .map(|e| e.path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_full_archive_round_trip() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);

        let artifact = archiver.create_full_at(&fx.source, at(0)).unwrap();
        assert_eq!(artifact.kind, BackupKind::Full);
        assert_eq!(artifact.files, 2);
        assert_eq!(artifact.directories, 2);
        assert!(artifact
            .path
            .ends_with("backup_full_20250601_120000.tar.gz"));

        archiver.extract(&artifact.path, &fx.restore).unwrap();
        assert_eq!(
            fs::read(fx.restore.join("docs/report.txt")).unwrap(),
            b"quarterly numbers"
        );
        assert_eq!(fs::read(fx.restore.join("notes.txt")).unwrap(), b"remember the milk");
        assert!(fx.restore.join("docs/empty").is_dir());
    }

    #[test]
    fn test_full_does_not_touch_snapshot_state() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);

        archiver.create_full_at(&fx.source, at(0)).unwrap();
        assert!(!fx.backups.join(SNAPSHOT_FILE_NAME).exists());
    }

    #[test]
    fn test_incremental_without_state_is_full() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);
        let snar = fx.backups.join(SNAPSHOT_FILE_NAME);

        let artifact = archiver.create_incremental_at(&fx.source, &snar, at(0)).unwrap();
        assert!(snar.exists());
        assert_eq!(artifact.files, 2);

        archiver.extract(&artifact.path, &fx.restore).unwrap();
        assert!(fx.restore.join("docs/report.txt").exists());
        assert!(fx.restore.join("notes.txt").exists());
    }

    #[test]
    fn test_incremental_without_changes_is_empty() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);
        let snar = fx.backups.join(SNAPSHOT_FILE_NAME);

        archiver.create_incremental_at(&fx.source, &snar, at(0)).unwrap();
        let second = archiver.create_incremental_at(&fx.source, &snar, at(1)).unwrap();

        assert_eq!(second.files, 0);
        let entries = archiver.list_entries(&second.path).unwrap();
        assert!(file_paths(&entries).is_empty());
    }

    #[test]
    fn test_incremental_contains_only_changed_files() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);
        let snar = fx.backups.join(SNAPSHOT_FILE_NAME);

        archiver.create_incremental_at(&fx.source, &snar, at(0)).unwrap();
        fs::write(fx.source.join("notes.txt"), b"remember the milk and eggs").unwrap();
        fs::write(fx.source.join("new.txt"), b"fresh").unwrap();

        let delta = archiver.create_incremental_at(&fx.source, &snar, at(1)).unwrap();
        let entries = archiver.list_entries(&delta.path).unwrap();
        let mut files = file_paths(&entries);
        files.sort();
        assert_eq!(files, vec!["new.txt".to_string(), "notes.txt".to_string()]);
    }

    #[test]
    fn test_backup_dir_inside_source_is_skipped() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(fx.source.join(".backups"));

        let first = archiver.create_full_at(&fx.source, at(0)).unwrap();
        let second = archiver.create_full_at(&fx.source, at(1)).unwrap();

        let entries = archiver.list_entries(&second.path).unwrap();
        assert!(entries
            .iter()
            .all(|e| !e.path.starts_with(".backups")));
        assert_eq!(first.files, second.files);
    }

    #[test]
    fn test_same_second_collision_refused() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);

        let first = archiver.create_full_at(&fx.source, at(0)).unwrap();
        let original = fs::read(&first.path).unwrap();

        let second = archiver.create_full_at(&fx.source, at(0));
        assert!(matches!(second, Err(BackupError::Archive { partial: None, .. })));
        assert_eq!(fs::read(&first.path).unwrap(), original);
    }

    #[test]
    fn test_missing_source_fails() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);

        let result = archiver.create_full_at(&fx.source.join("nope"), at(0));
        assert!(matches!(result, Err(BackupError::Archive { .. })));
    }

    #[test]
    fn test_extract_corrupt_archive_fails() {
        let fx = create_test_fixture();
        let archiver = Archiver::new(&fx.backups);
        let artifact = archiver.create_full_at(&fx.source, at(0)).unwrap();

        let bytes = fs::read(&artifact.path).unwrap();
        fs::write(&artifact.path, &bytes[..bytes.len() / 2]).unwrap();

        let result = archiver.extract(&artifact.path, &fx.restore);
        assert!(matches!(result, Err(BackupError::Extraction { .. })));

        fs::write(&artifact.path, b"definitely not gzip").unwrap();
        let result = archiver.extract(&artifact.path, &fx.restore);
        assert!(matches!(result, Err(BackupError::Extraction { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_directory_round_trip() {
        use std::os::unix::fs::PermissionsExt;

        let fx = create_test_fixture();
        let locked = fx.source.join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("file.txt"), b"sealed away").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let archiver = Archiver::new(&fx.backups);
        let artifact = archiver.create_full_at(&fx.source, at(0)).unwrap();
        let result = archiver.extract(&artifact.path, &fx.restore);

        let restored = fx.restore.join("locked");
        let mode = fs::metadata(&restored).map(|m| m.permissions().mode() & 0o777);
        let content = fs::read(restored.join("file.txt"));

        // Allow the TempDir to clean up
        for dir in [&locked, &restored] {
            let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o755));
        }

        result.unwrap();
        assert_eq!(content.unwrap(), b"sealed away");
        assert_eq!(mode.unwrap(), 0o555);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_stored_as_links() {
        let fx = create_test_fixture();
        std::os::unix::fs::symlink("notes.txt", fx.source.join("link")).unwrap();
        let archiver = Archiver::new(&fx.backups);

        let artifact = archiver.create_full_at(&fx.source, at(0)).unwrap();
        archiver.extract(&artifact.path, &fx.restore).unwrap();

        let link = fx.restore.join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("notes.txt"));
    }
}
