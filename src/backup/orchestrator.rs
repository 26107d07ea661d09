//! Backup orchestrator
//!
//! Sequences Archiver → Sealer → Replicator → Notifier for backups and
//! reverses the first two for restores. Archiving and sealing failures are
//! fatal; replication and notification failures are recorded in the outcome.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::archive::{parse_archive_name, ArchiveArtifact, Archiver, BackupKind, EntryKind};
use crate::config::{BackupPaths, Settings};
use crate::crypto::{is_sealed, KdfSettings, SecureString, Sealer, SEALED_SUFFIX};
use crate::crypto::sealer::SEAL_ALGORITHM;
use crate::error::{BackupError, BackupResult};
use crate::notify::{notifier_from_settings, Notifier};
use crate::replicate::{replicator_from_settings, Replicator};
use crate::storage::SnapshotLock;

use super::catalog::{self, BackupInfo};
use super::pipeline::{
    BackupOutcome, NotificationStatus, PipelineStage, ReplicationStatus, RestoreOutcome,
    SealedArtifact, VerificationReport,
};
use super::restore::TransientBuffer;

/// Everything a pipeline run needs, fixed at construction
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Where archives and the snapshot state live
    pub backup_dir: PathBuf,
    pub snapshot_file: PathBuf,
    pub passphrase: SecureString,
    /// Replication target; empty skips replication
    pub remote_destination: String,
    pub notification_recipient: String,
    pub kdf: KdfSettings,
}

impl BackupConfig {
    pub fn new(backup_dir: impl Into<PathBuf>, passphrase: impl Into<SecureString>) -> Self {
        let backup_dir = backup_dir.into();
        Self {
            snapshot_file: backup_dir.join(crate::archive::SNAPSHOT_FILE_NAME),
            backup_dir,
            passphrase: passphrase.into(),
            remote_destination: String::new(),
            notification_recipient: String::new(),
            kdf: KdfSettings::default(),
        }
    }

    /// Build from resolved paths and settings
    pub fn from_settings(paths: &BackupPaths, settings: &Settings, passphrase: SecureString) -> Self {
        Self {
            backup_dir: paths.backup_dir(),
            snapshot_file: paths.snapshot_file(),
            passphrase,
            remote_destination: settings.remote_destination.trim().to_string(),
            notification_recipient: settings.notification_recipient.trim().to_string(),
            kdf: settings.kdf,
        }
    }

    pub fn with_remote_destination(mut self, remote: impl Into<String>) -> Self {
        self.remote_destination = remote.into();
        self
    }

    pub fn with_notification_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.notification_recipient = recipient.into();
        self
    }

    pub fn with_kdf(mut self, kdf: KdfSettings) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_snapshot_file(mut self, snapshot_file: impl Into<PathBuf>) -> Self {
        self.snapshot_file = snapshot_file.into();
        self
    }
}

/// Records the stages a run passes through and logs each transition
struct StageTracker {
    stages: Vec<PipelineStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stages: vec![PipelineStage::Idle],
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        info!(stage = %stage, "pipeline stage");
        self.stages.push(stage);
    }

    fn current(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Idle)
    }

    fn into_stages(self) -> Vec<PipelineStage> {
        self.stages
    }
}

/// Runs backup, restore and verification pipelines
pub struct BackupOrchestrator {
    config: BackupConfig,
    archiver: Archiver,
    sealer: Sealer,
    replicator: Box<dyn Replicator>,
    notifier: Box<dyn Notifier>,
}

impl BackupOrchestrator {
    pub fn new(
        config: BackupConfig,
        replicator: Box<dyn Replicator>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            archiver: Archiver::new(&config.backup_dir),
            sealer: Sealer::new(config.kdf),
            config,
            replicator,
            notifier,
        }
    }

    /// Build an orchestrator with the replicator and notifier chosen in settings
    pub fn from_settings(paths: &BackupPaths, settings: &Settings, passphrase: SecureString) -> Self {
        Self::new(
            BackupConfig::from_settings(paths, settings, passphrase),
            replicator_from_settings(settings),
            notifier_from_settings(settings, paths),
        )
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Archive all of `source`, seal it, replicate and notify
    pub fn create_full_backup(&self, source: &Path) -> BackupResult<BackupOutcome> {
        self.run_backup(BackupKind::Full, source)
    }

    /// Archive what changed in `source` since the last incremental run,
    /// seal it, replicate and notify.
    ///
    /// Holds the snapshot lock for the whole run.
    pub fn create_incremental_backup(&self, source: &Path) -> BackupResult<BackupOutcome> {
        self.run_backup(BackupKind::Incremental, source)
    }

    fn run_backup(&self, kind: BackupKind, source: &Path) -> BackupResult<BackupOutcome> {
        let mut tracker = StageTracker::new();

        if self.config.passphrase.is_empty() {
            return Err(BackupError::Config(
                "No passphrase configured; refusing to create an unsealed backup".into(),
            ));
        }

        tracker.enter(PipelineStage::Archiving);
        let archived = match kind {
            BackupKind::Full => self.archiver.create_full(source).map(|a| (a, None)),
            BackupKind::Incremental => SnapshotLock::acquire(&self.config.snapshot_file)
                .and_then(|lock| {
                    self.archiver
                        .create_incremental(source, &self.config.snapshot_file)
                        .map(|a| (a, Some(lock)))
                }),
        };
        // The lock, if any, lives until the outcome is returned
        let (artifact, _lock) = match archived {
            Ok(archived) => archived,
            Err(e) => return Err(self.fail(tracker, kind, e)),
        };

        tracker.enter(PipelineStage::Sealing);
        let sealed = match self.seal(artifact) {
            Ok(sealed) => sealed,
            Err(e) => return Err(self.fail(tracker, kind, e)),
        };

        tracker.enter(PipelineStage::Replicating);
        let replication = self.replicate(&sealed.path);

        tracker.enter(PipelineStage::Notifying);
        let message = success_message(kind, &sealed, &replication);
        let notification = self.send_notification(&message);

        tracker.enter(PipelineStage::Done);

        let outcome = BackupOutcome {
            kind,
            sealed,
            stages: tracker.into_stages(),
            replication,
            notification,
        };
        info!(summary = %outcome.summary(), "backup complete");
        Ok(outcome)
    }

    fn seal(&self, artifact: ArchiveArtifact) -> BackupResult<SealedArtifact> {
        let path = self.sealer.seal(&artifact.path, &self.config.passphrase)?;
        Ok(SealedArtifact {
            path,
            origin: artifact,
            algorithm: SEAL_ALGORITHM,
        })
    }

    fn replicate(&self, sealed: &Path) -> ReplicationStatus {
        let remote = self.config.remote_destination.as_str();
        if !self.replicator.is_enabled() || remote.is_empty() {
            info!("replication skipped; no remote destination");
            return ReplicationStatus::Skipped;
        }

        match self.replicator.upload(sealed, remote) {
            Ok(()) => {
                info!(replicator = self.replicator.name(), remote, "sealed archive replicated");
                ReplicationStatus::Uploaded {
                    destination: remote.to_string(),
                }
            }
            Err(e) => {
                warn!(replicator = self.replicator.name(), error = %e, "replication failed");
                ReplicationStatus::Failed(e)
            }
        }
    }

    fn send_notification(&self, message: &str) -> NotificationStatus {
        if !self.notifier.is_enabled() {
            return NotificationStatus::Skipped;
        }

        match self
            .notifier
            .notify(message, &self.config.notification_recipient)
        {
            Ok(()) => NotificationStatus::Sent,
            Err(e) => {
                warn!(notifier = self.notifier.name(), error = %e, "notification failed");
                NotificationStatus::Failed(e)
            }
        }
    }

    /// Move to `Failed`, tell the operator, and hand the error back
    fn fail(&self, mut tracker: StageTracker, kind: BackupKind, err: BackupError) -> BackupError {
        let stage = tracker.current();
        tracker.enter(PipelineStage::Failed);
        error!(stage = %stage, error = %err, "backup failed");

        let mut message = format!("tarseal: {} backup FAILED\n{} failed: {}", kind, stage, err);
        if let Some(leftover) = err.leftover() {
            message.push_str(&format!("\nLeft on disk: {}", leftover.display()));
        }
        let _ = self.send_notification(&message);

        err
    }

    /// Restore `artifact` into `destination`, unsealing first if needed.
    ///
    /// Any transient plaintext is removed on every exit path.
    pub fn restore_backup(&self, artifact: &Path, destination: &Path) -> BackupResult<RestoreOutcome> {
        let mut tracker = StageTracker::new();

        tracker.enter(PipelineStage::DetectingSealed);
        let was_sealed = self.detect_sealed(artifact)?;

        let buffer = if was_sealed {
            tracker.enter(PipelineStage::Unsealing);
            Some(self.unseal_to_buffer(artifact)?)
        } else {
            None
        };
        let plaintext = buffer.as_ref().map_or(artifact, |b| b.path());

        tracker.enter(PipelineStage::Extracting);
        let entries = self.archiver.extract(plaintext, destination)?;

        tracker.enter(PipelineStage::CleaningUp);
        drop(buffer);

        tracker.enter(PipelineStage::Done);
        let outcome = RestoreOutcome {
            artifact: artifact.to_path_buf(),
            destination: destination.to_path_buf(),
            was_sealed,
            entries,
            stages: tracker.into_stages(),
        };
        info!(summary = %outcome.summary(), "restore complete");
        Ok(outcome)
    }

    /// Check that `artifact` unseals and reads as a complete archive without
    /// extracting anything
    pub fn verify_backup(&self, artifact: &Path) -> BackupResult<VerificationReport> {
        let mut tracker = StageTracker::new();

        tracker.enter(PipelineStage::DetectingSealed);
        let sealed = self.detect_sealed(artifact)?;

        let buffer = if sealed {
            tracker.enter(PipelineStage::Unsealing);
            Some(self.unseal_to_buffer(artifact)?)
        } else {
            None
        };
        let plaintext = buffer.as_ref().map_or(artifact, |b| b.path());

        tracker.enter(PipelineStage::ListingEntries);
        let entries = self.archiver.list_entries(plaintext)?;

        tracker.enter(PipelineStage::CleaningUp);
        drop(buffer);

        let directories = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .count();
        let kind = artifact
            .file_name()
            .and_then(|n| parse_archive_name(&n.to_string_lossy()))
            .map(|parsed| parsed.kind);

        Ok(VerificationReport {
            artifact: artifact.to_path_buf(),
            kind,
            sealed,
            files: entries.len() - directories,
            directories,
        })
    }

    /// List archives in the backup directory, newest first
    pub fn list_backups(&self) -> BackupResult<Vec<BackupInfo>> {
        catalog::list_backups(&self.config.backup_dir)
    }

    /// Resolve `latest`, a file name in the backup directory, or a path
    pub fn resolve_artifact(&self, identifier: &str) -> BackupResult<PathBuf> {
        catalog::resolve_artifact(&self.config.backup_dir, identifier)
    }

    fn detect_sealed(&self, artifact: &Path) -> BackupResult<bool> {
        if !artifact.is_file() {
            return Err(BackupError::backup_not_found(artifact.display().to_string()));
        }

        let by_name = artifact
            .file_name()
            .map_or(false, |n| n.to_string_lossy().ends_with(SEALED_SUFFIX));
        Ok(by_name || is_sealed(artifact)?)
    }

    fn unseal_to_buffer(&self, sealed: &Path) -> BackupResult<TransientBuffer> {
        fs::create_dir_all(&self.config.backup_dir).map_err(|e| {
            BackupError::decryption(
                sealed,
                format!("Cannot create {}: {}", self.config.backup_dir.display(), e),
            )
        })?;

        let buffer = TransientBuffer::new_in(&self.config.backup_dir);
        self.sealer
            .unseal(sealed, &self.config.passphrase, buffer.path())?;
        Ok(buffer)
    }
}

fn success_message(kind: BackupKind, sealed: &SealedArtifact, replication: &ReplicationStatus) -> String {
    let subject = match replication {
        ReplicationStatus::Failed(_) => format!("tarseal: {} backup succeeded, replication FAILED", kind),
        _ => format!("tarseal: {} backup succeeded", kind),
    };
    format!(
        "{}\nArchive: {}\nSource: {}\nFiles: {}\nDirectories: {}\nReplication: {}",
        subject,
        sealed.path.display(),
        sealed.origin.source.display(),
        sealed.origin.files,
        sealed.origin.directories,
        replication
    )
}
