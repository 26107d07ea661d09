//! Archive creation and extraction
//!
//! - `archiver`: writes full and incremental `.tar.gz` archives and unpacks them
//! - `snapshot`: the persistent baseline incremental runs are computed against
//! - `naming`: the `backup_<kind>_<YYYYMMDD>_<HHMMSS>.tar.gz` file names

mod archiver;
pub mod naming;
pub mod snapshot;

pub use archiver::{ArchiveArtifact, ArchivedEntry, Archiver};
pub use naming::{archive_file_name, parse_archive_name, BackupKind, ParsedName};
pub use snapshot::{EntryKind, FileRecord, SnapshotState, SnapshotStore, SNAPSHOT_FILE_NAME};
