//! tarseal - encrypted full and incremental directory backups
//!
//! A backup run archives a directory tree as `.tar.gz`, seals the archive
//! with AES-256-GCM under an Argon2id-derived key, replicates the sealed
//! file to a remote destination and reports the outcome. Restores reverse
//! the sealing and extraction, never leaving decrypted data behind.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `archive`: full and incremental archives and the snapshot state
//! - `crypto`: key derivation and sealing
//! - `replicate`: best-effort copies to a remote destination
//! - `notify`: best-effort outcome notifications
//! - `backup`: the orchestrator that sequences the above
//! - `config`: path resolution and user settings
//! - `storage`: atomic JSON writes and the snapshot lock
//! - `cli`: command handlers for the `tarseal` binary
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use tarseal::backup::{BackupConfig, BackupOrchestrator};
//! use tarseal::notify::NoopNotifier;
//! use tarseal::replicate::RcloneReplicator;
//!
//! let config = BackupConfig::new("/var/backups/home", passphrase)
//!     .with_remote_destination("s3:offsite/home");
//! let orchestrator = BackupOrchestrator::new(
//!     config,
//!     Box::new(RcloneReplicator::default()),
//!     Box::new(NoopNotifier),
//! );
//! let outcome = orchestrator.create_incremental_backup(Path::new("/home/me"))?;
//! ```

pub mod archive;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod notify;
pub mod replicate;
pub mod storage;

pub use error::{BackupError, BackupResult};
