//! Notification journal
//!
//! Each notification is written as a single JSON line and flushed
//! immediately, so the journal doubles as a history of backup outcomes.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{split_subject, Notifier};
use crate::error::{BackupError, BackupResult, NotificationError};

/// One delivered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub recipient: String,
    pub subject: String,
    pub message: String,
}

/// Appends notifications to a JSONL file
#[derive(Debug, Clone)]
pub struct JournalNotifier {
    path: PathBuf,
}

impl JournalNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &JournalEntry) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create journal directory: {}", e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("Failed to open journal: {}", e))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| format!("Failed to serialize journal entry: {}", e))?;

        writeln!(file, "{}", json).map_err(|e| format!("Failed to write journal entry: {}", e))?;
        file.flush()
            .map_err(|e| format!("Failed to flush journal: {}", e))
    }

    /// Read all entries, oldest first
    pub fn read_all(&self) -> BackupResult<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| BackupError::Io(format!("Failed to open journal: {}", e)))?;

        let mut entries = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                BackupError::Io(format!("Failed to read journal line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: JournalEntry = serde_json::from_str(&line).map_err(|e| {
                BackupError::Json(format!(
                    "Failed to parse journal entry at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

impl Notifier for JournalNotifier {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn notify(&self, message: &str, recipient: &str) -> Result<(), NotificationError> {
        let (subject, body) = split_subject(message);
        let entry = JournalEntry {
            timestamp: Utc::now(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            message: body.to_string(),
        };

        self.append(&entry)
            .map_err(|message| NotificationError::new(recipient, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let temp = TempDir::new().unwrap();
        let journal = JournalNotifier::new(temp.path().join("notifications.jsonl"));

        assert!(journal.read_all().unwrap().is_empty());

        journal
            .notify("Backup succeeded\nFull backup sealed", "ops@example.com")
            .unwrap();
        journal.notify("Backup failed", "").unwrap();

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "Backup succeeded");
        assert_eq!(entries[0].message, "Full backup sealed");
        assert_eq!(entries[0].recipient, "ops@example.com");
        assert_eq!(entries[1].subject, "Backup failed");
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn test_unwritable_journal_is_notification_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let journal = JournalNotifier::new(blocker.join("notifications.jsonl"));
        let err = journal.notify("Backup succeeded", "ops").unwrap_err();
        assert_eq!(err.recipient, "ops");
    }
}
