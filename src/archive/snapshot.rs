//! Snapshot state for incremental backups
//!
//! The snapshot state records the metadata of every entry seen by the last
//! incremental run. The next incremental run stores only entries whose
//! metadata differs from the record. Full backups and restores never touch
//! it.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BackupResult;
use crate::storage::{read_json, write_json_atomic};

/// Fixed name of the snapshot state inside the backup directory
pub const SNAPSHOT_FILE_NAME: &str = "backup.snar";

const SNAPSHOT_VERSION: u32 = 1;

/// Type of a tracked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Metadata recorded for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
    pub inode: u64,
    pub device: u64,
}

impl FileRecord {
    /// Build a record from `symlink_metadata`, or `None` for sockets, fifos
    /// and devices, which are not archived
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            return None;
        };

        let (mtime_secs, mtime_nanos, inode, device) = platform_stamp(metadata);

        Some(Self {
            kind,
            size: metadata.len(),
            mtime_secs,
            mtime_nanos,
            inode,
            device,
        })
    }
}

#[cfg(unix)]
fn platform_stamp(metadata: &Metadata) -> (i64, u32, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (
        metadata.mtime(),
        metadata.mtime_nsec() as u32,
        metadata.ino(),
        metadata.dev(),
    )
}

#[cfg(not(unix))]
fn platform_stamp(metadata: &Metadata) -> (i64, u32, u64, u64) {
    let since_epoch = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .unwrap_or_default();
    (since_epoch.as_secs() as i64, since_epoch.subsec_nanos(), 0, 0)
}

/// Persistent baseline for incremental runs against one source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotState {
    pub version: u32,
    /// Canonical source root this baseline belongs to
    pub source: PathBuf,
    pub recorded_at: DateTime<Utc>,
    /// Entries keyed by path relative to the source root
    pub entries: BTreeMap<String, FileRecord>,
}

impl SnapshotState {
    /// Start an empty baseline for `source`
    pub fn new(source: &Path) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            source: source.to_path_buf(),
            recorded_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Record an entry's metadata
    pub fn record(&mut self, key: String, record: FileRecord) {
        self.entries.insert(key, record);
    }

    /// Whether `record` differs from what this baseline holds for `key`
    pub fn is_changed(&self, key: &str, record: &FileRecord) -> bool {
        self.entries.get(key) != Some(record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Marks a key holding the base64 of raw path bytes; file names never
/// contain NUL, so it cannot collide with a readable key
const RAW_KEY_MARKER: char = '\0';

/// Key for a path relative to the source root.
///
/// UTF-8 paths are stored as they read. Anything else is keyed on its raw
/// bytes so distinct names never share a record.
pub fn snapshot_key(relative: &Path) -> String {
    match relative.to_str() {
        Some(path) => path.replace('\\', "/"),
        None => raw_key(relative),
    }
}

#[cfg(unix)]
fn raw_key(relative: &Path) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::os::unix::ffi::OsStrExt;

    format!(
        "{}{}",
        RAW_KEY_MARKER,
        STANDARD.encode(relative.as_os_str().as_bytes())
    )
}

#[cfg(windows)]
fn raw_key(relative: &Path) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::os::windows::ffi::OsStrExt;

    let bytes: Vec<u8> = relative
        .as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect();
    format!("{}{}", RAW_KEY_MARKER, STANDARD.encode(bytes))
}

#[cfg(not(any(unix, windows)))]
fn raw_key(relative: &Path) -> String {
    relative.to_string_lossy().into_owned()
}

/// Reads and writes the snapshot state file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the baseline recorded for `source`.
    ///
    /// A missing, unreadable or foreign baseline yields `None`, which makes
    /// the next incremental run archive everything.
    pub fn load_for(&self, source: &Path) -> Option<SnapshotState> {
        let state: SnapshotState = match read_json(&self.path) {
            Ok(Some(state)) => state,
            Ok(None) => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable snapshot state");
                return None;
            }
        };

        if state.version != SNAPSHOT_VERSION {
            warn!(version = state.version, "ignoring snapshot state with unknown version");
            return None;
        }
        if state.source != source {
            warn!(
                recorded = %state.source.display(),
                requested = %source.display(),
                "snapshot state belongs to another source tree"
            );
            return None;
        }

        Some(state)
    }

    /// Replace the baseline atomically
    pub fn save(&self, state: &SnapshotState) -> BackupResult<()> {
        write_json_atomic(&self.path, state)
    }
}
