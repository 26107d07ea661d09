//! Backup and restore orchestration
//!
//! # Architecture
//!
//! - `BackupOrchestrator`: runs the backup pipeline
//!   (`Idle → Archiving → Sealing → Replicating → Notifying → Done`) and the
//!   restore pipeline (`DetectingSealed → Unsealing → Extracting → CleaningUp`)
//! - `catalog`: lists and resolves archives in the backup directory
//! - `TransientBuffer`: plaintext produced while restoring a sealed archive,
//!   removed when dropped
//!
//! # Example
//!
//! ```rust,ignore
//! use tarseal::backup::BackupOrchestrator;
//! use tarseal::config::{BackupPaths, Settings};
//!
//! let paths = BackupPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let orchestrator = BackupOrchestrator::from_settings(&paths, &settings, passphrase);
//!
//! let outcome = orchestrator.create_full_backup(Path::new("/srv/data"))?;
//! println!("{}", outcome.summary());
//!
//! let latest = orchestrator.resolve_artifact("latest")?;
//! orchestrator.restore_backup(&latest, Path::new("/srv/restore"))?;
//! ```

pub mod catalog;
mod orchestrator;
mod pipeline;
mod restore;

pub use catalog::{format_size, list_backups, resolve_artifact, BackupInfo};
pub use orchestrator::{BackupConfig, BackupOrchestrator};
pub use pipeline::{
    BackupOutcome, NotificationStatus, PipelineStage, ReplicationStatus, RestoreOutcome,
    SealedArtifact, VerificationReport,
};
pub use restore::TransientBuffer;
