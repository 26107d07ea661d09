//! Best-effort outcome notifications
//!
//! The first line of a message is its subject. Delivery failures are
//! returned as [`NotificationError`] and never change a backup's outcome.

mod journal;

use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::{BackupPaths, NotifierKind, Settings};
use crate::error::NotificationError;

pub use journal::{JournalEntry, JournalNotifier};

/// Delivers a backup outcome message
pub trait Notifier {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn notify(&self, message: &str, recipient: &str) -> Result<(), NotificationError>;

    /// Whether this notifier actually delivers anything
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Split a message into its subject line and body
pub(crate) fn split_subject(message: &str) -> (&str, &str) {
    match message.split_once('\n') {
        Some((subject, body)) => (subject.trim(), body.trim_start_matches('\n')),
        None => (message.trim(), ""),
    }
}

/// Pipes the message to `mail -s <subject> <recipient>`
#[derive(Debug, Clone)]
pub struct MailNotifier {
    binary: String,
}

impl MailNotifier {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for MailNotifier {
    fn default() -> Self {
        Self::new("mail")
    }
}

impl Notifier for MailNotifier {
    fn name(&self) -> &'static str {
        "mail"
    }

    fn notify(&self, message: &str, recipient: &str) -> Result<(), NotificationError> {
        if recipient.trim().is_empty() {
            return Err(NotificationError::new(recipient, "no recipient configured"));
        }

        let (subject, body) = split_subject(message);

        let mut child = Command::new(&self.binary)
            .arg("-s")
            .arg(subject)
            .arg(recipient)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| NotificationError::new(recipient, format!("Failed to run {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(body.as_bytes())
                .map_err(|e| NotificationError::new(recipient, format!("Failed to write message: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| NotificationError::new(recipient, format!("Failed to wait for {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotificationError::new(
                recipient,
                format!("{} exited with {}: {}", self.binary, output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

/// Notifications disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn name(&self) -> &'static str {
        "none"
    }

    fn notify(&self, _message: &str, _recipient: &str) -> Result<(), NotificationError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the notifier selected in `settings`
pub fn notifier_from_settings(settings: &Settings, paths: &BackupPaths) -> Box<dyn Notifier> {
    match settings.notifier {
        NotifierKind::Mail => Box::new(MailNotifier::default()),
        NotifierKind::Journal => Box::new(JournalNotifier::new(paths.notification_journal())),
        NotifierKind::None => Box::new(NoopNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_subject() {
        assert_eq!(split_subject("Done\nall good"), ("Done", "all good"));
        assert_eq!(split_subject("Done"), ("Done", ""));
        assert_eq!(split_subject("Done\n\nbody"), ("Done", "body"));
    }

    #[test]
    fn test_mail_requires_recipient() {
        let err = MailNotifier::default().notify("Backup succeeded", "").unwrap_err();
        assert!(err.message.contains("no recipient"));
    }

    #[test]
    fn test_mail_missing_binary_is_error() {
        let notifier = MailNotifier::new("tarseal-no-such-mail");
        assert!(notifier.notify("Backup succeeded", "ops@example.com").is_err());
    }

    #[test]
    fn test_from_settings() {
        let temp = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp.path());
        let mut settings = Settings::default();

        assert_eq!(notifier_from_settings(&settings, &paths).name(), "journal");

        settings.notifier = NotifierKind::Mail;
        assert_eq!(notifier_from_settings(&settings, &paths).name(), "mail");

        settings.notifier = NotifierKind::None;
        assert!(!notifier_from_settings(&settings, &paths).is_enabled());
    }
}
