//! Archive naming
//!
//! Archive names are `backup_<kind>_<YYYYMMDD>_<HHMMSS>.tar.gz`, with `.enc`
//! appended once sealed. The names are shared with existing backup sets and
//! must not change.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::crypto::SEALED_SUFFIX;

/// Extension of a plaintext archive
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// strftime format of the timestamp embedded in archive names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const NAME_PREFIX: &str = "backup_";

/// Kind of archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    /// Complete tree
    Full,
    /// Entries changed since the recorded snapshot state
    Incremental,
}

impl BackupKind {
    /// Tag used in archive names
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Incremental => write!(f, "Incremental"),
        }
    }
}

/// What an archive file name says about the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub kind: BackupKind,
    pub created_at: NaiveDateTime,
    pub sealed: bool,
}

/// Build the plaintext archive name for a backup taken at `when`
pub fn archive_file_name(kind: BackupKind, when: NaiveDateTime) -> String {
    format!(
        "{}{}_{}{}",
        NAME_PREFIX,
        kind.tag(),
        when.format(TIMESTAMP_FORMAT),
        ARCHIVE_EXTENSION
    )
}

/// Parse an archive file name, plaintext or sealed
pub fn parse_archive_name(filename: &str) -> Option<ParsedName> {
    let (rest, sealed) = match filename.strip_suffix(SEALED_SUFFIX) {
        Some(rest) => (rest, true),
        None => (filename, false),
    };

    let rest = rest
        .strip_suffix(ARCHIVE_EXTENSION)?
        .strip_prefix(NAME_PREFIX)?;

    let (kind, timestamp) = if let Some(ts) = rest.strip_prefix("full_") {
        (BackupKind::Full, ts)
    } else if let Some(ts) = rest.strip_prefix("incremental_") {
        (BackupKind::Incremental, ts)
    } else {
        return None;
    };

    Some(ParsedName {
        kind,
        created_at: parse_timestamp(timestamp)?,
        sealed,
    })
}

/// Parse `YYYYMMDD_HHMMSS`
fn parse_timestamp(timestamp: &str) -> Option<NaiveDateTime> {
    let (date_part, time_part) = timestamp.split_once('_')?;

    if date_part.len() != 8 || time_part.len() != 6 {
        return None;
    }
    if !date_part.bytes().chain(time_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i32 = date_part[0..4].parse().ok()?;
    let month: u32 = date_part[4..6].parse().ok()?;
    let day: u32 = date_part[6..8].parse().ok()?;
    let hour: u32 = time_part[0..2].parse().ok()?;
    let minute: u32 = time_part[2..4].parse().ok()?;
    let second: u32 = time_part[4..6].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn sample_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 27)
            .unwrap()
            .and_hms_opt(14, 30, 22)
            .unwrap()
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            archive_file_name(BackupKind::Full, sample_time()),
            "backup_full_20251127_143022.tar.gz"
        );
        assert_eq!(
            archive_file_name(BackupKind::Incremental, sample_time()),
            "backup_incremental_20251127_143022.tar.gz"
        );
    }

    #[test]
    fn test_parse_plain_and_sealed() {
        let parsed = parse_archive_name("backup_full_20251127_143022.tar.gz").unwrap();
        assert_eq!(parsed.kind, BackupKind::Full);
        assert!(!parsed.sealed);
        assert_eq!(parsed.created_at.year(), 2025);
        assert_eq!(parsed.created_at.month(), 11);
        assert_eq!(parsed.created_at.second(), 22);

        let parsed = parse_archive_name("backup_incremental_20251127_143022.tar.gz.enc").unwrap();
        assert_eq!(parsed.kind, BackupKind::Incremental);
        assert!(parsed.sealed);
        assert_eq!(parsed.created_at, sample_time());
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(parse_archive_name("backup.snar").is_none());
        assert!(parse_archive_name("backup_weekly_20251127_143022.tar.gz").is_none());
        assert!(parse_archive_name("backup_full_20251127-143022.tar.gz").is_none());
        assert!(parse_archive_name("backup_full_20251327_143022.tar.gz").is_none());
        assert!(parse_archive_name("backup_full_20251127_143022.zip").is_none());
        assert!(parse_archive_name(".restore-1234.tar.gz").is_none());
    }

    #[test]
    fn test_name_round_trip() {
        let name = archive_file_name(BackupKind::Incremental, sample_time());
        let parsed = parse_archive_name(&name).unwrap();
        assert_eq!(parsed.kind, BackupKind::Incremental);
        assert_eq!(parsed.created_at, sample_time());
    }
}
