//! Listing and resolving archives in a backup directory

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::archive::{parse_archive_name, BackupKind};
use crate::error::{BackupError, BackupResult};

/// Metadata about an archive in the backup directory
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    /// Archive filename
    pub filename: String,
    /// Full path to the archive
    pub path: PathBuf,
    pub kind: BackupKind,
    /// Local time parsed from the filename
    pub created_at: NaiveDateTime,
    pub size_bytes: u64,
    pub sealed: bool,
}

/// List all archives in `backup_dir`, newest first
///
/// Files that don't follow the archive naming scheme (the snapshot state,
/// lock and temp files) are ignored.
pub fn list_backups(backup_dir: &Path) -> BackupResult<Vec<BackupInfo>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();

    for entry in fs::read_dir(backup_dir)
        .map_err(|e| BackupError::Io(format!("Failed to read backup directory: {}", e)))?
    {
        let entry = entry
            .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;

        if let Some(info) = parse_backup_info(&entry.path()) {
            backups.push(info);
        }
    }

    // Newest first; sealed before plaintext for the same timestamp
    backups.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.sealed.cmp(&a.sealed))
            .then_with(|| a.filename.cmp(&b.filename))
    });

    Ok(backups)
}

fn parse_backup_info(path: &Path) -> Option<BackupInfo> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let parsed = parse_archive_name(&filename)?;

    let metadata = fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }

    Some(BackupInfo {
        filename,
        path: path.to_path_buf(),
        kind: parsed.kind,
        created_at: parsed.created_at,
        size_bytes: metadata.len(),
        sealed: parsed.sealed,
    })
}

/// Resolve a backup identifier to a path
///
/// Accepts `latest`, a path to an existing file, or a file name inside
/// `backup_dir`.
pub fn resolve_artifact(backup_dir: &Path, identifier: &str) -> BackupResult<PathBuf> {
    if identifier.eq_ignore_ascii_case("latest") {
        return list_backups(backup_dir)?
            .into_iter()
            .next()
            .map(|b| b.path)
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    let path = PathBuf::from(identifier);
    if path.is_file() {
        return Ok(path);
    }

    let in_backup_dir = backup_dir.join(identifier);
    if in_backup_dir.is_file() {
        return Ok(in_backup_dir);
    }

    Err(BackupError::backup_not_found(identifier))
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
