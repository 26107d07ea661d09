//! Backup CLI commands
//!
//! Implements the commands that run the backup, restore and verification
//! pipelines and list the backup directory.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tabled::{builder::Builder, settings::Style};

use crate::backup::{format_size, BackupInfo, BackupOrchestrator, BackupOutcome};
use crate::config::paths::BackupPaths;
use crate::config::settings::Settings;
use crate::crypto::{is_sealed, SecureString, SEALED_SUFFIX};
use crate::error::BackupResult;

use super::passphrase::resolve_passphrase;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a full backup of SOURCE (default: current directory)
    Full {
        /// Directory to back up
        source: Option<PathBuf>,
    },

    /// Back up what changed in SOURCE since the last incremental run
    Incremental {
        /// Directory to back up
        source: Option<PathBuf>,
    },

    /// Restore a backup into DEST (default: current directory)
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,

        /// Directory to restore into
        dest: Option<PathBuf>,
    },

    /// List all available backups
    List {
        /// Show full paths
        #[arg(short, long)]
        long: bool,
    },

    /// Check that a backup unseals and reads without restoring it
    Verify {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &BackupPaths,
    settings: &Settings,
    passphrase_file: Option<&Path>,
    cmd: BackupCommands,
) -> BackupResult<()> {
    match cmd {
        BackupCommands::Full { source } => {
            let source = source_or_cwd(source)?;
            let passphrase = resolve_passphrase(passphrase_file, settings)?;
            let orchestrator = BackupOrchestrator::from_settings(paths, settings, passphrase);

            println!("Creating full backup of {}...", source.display());
            let outcome = orchestrator.create_full_backup(&source)?;
            print_outcome(&outcome);
        }

        BackupCommands::Incremental { source } => {
            let source = source_or_cwd(source)?;
            let passphrase = resolve_passphrase(passphrase_file, settings)?;
            let orchestrator = BackupOrchestrator::from_settings(paths, settings, passphrase);

            println!("Creating incremental backup of {}...", source.display());
            let outcome = orchestrator.create_incremental_backup(&source)?;
            print_outcome(&outcome);
        }

        BackupCommands::Restore { backup, dest } => {
            let artifact = crate::backup::resolve_artifact(&paths.backup_dir(), &backup)?;
            let dest = source_or_cwd(dest)?;
            let passphrase = passphrase_for(&artifact, passphrase_file, settings)?;
            let orchestrator = BackupOrchestrator::from_settings(paths, settings, passphrase);

            println!("Restoring {} into {}...", artifact.display(), dest.display());
            let outcome = orchestrator.restore_backup(&artifact, &dest)?;
            println!("Restore complete!");
            println!("{}", outcome.summary());
        }

        BackupCommands::List { long } => {
            let backups = crate::backup::list_backups(&paths.backup_dir())?;

            if backups.is_empty() {
                println!("No backups found in {}.", paths.backup_dir().display());
                println!("Create one with: tarseal full <SOURCE>");
                return Ok(());
            }

            println!("{}", format_backup_table(&backups, long));
            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Verify { backup } => {
            let artifact = crate::backup::resolve_artifact(&paths.backup_dir(), &backup)?;
            let passphrase = passphrase_for(&artifact, passphrase_file, settings)?;
            let orchestrator = BackupOrchestrator::from_settings(paths, settings, passphrase);

            let report = orchestrator.verify_backup(&artifact)?;
            println!("Backup OK: {}", artifact.display());
            println!("{}", report.summary());
        }
    }

    Ok(())
}

/// Only sealed artifacts need a passphrase
fn passphrase_for(
    artifact: &Path,
    passphrase_file: Option<&Path>,
    settings: &Settings,
) -> BackupResult<SecureString> {
    let sealed_name = artifact.to_string_lossy().ends_with(SEALED_SUFFIX);
    if sealed_name || (artifact.is_file() && is_sealed(artifact)?) {
        resolve_passphrase(passphrase_file, settings)
    } else {
        Ok(SecureString::new(""))
    }
}

fn source_or_cwd(path: Option<PathBuf>) -> BackupResult<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(std::env::current_dir()?),
    }
}

fn print_outcome(outcome: &BackupOutcome) {
    println!("Backup created: {}", outcome.sealed.path.display());
    println!(
        "  {} files, {} directories",
        outcome.sealed.origin.files, outcome.sealed.origin.directories
    );
    println!("  Replication:  {}", outcome.replication);
    println!("  Notification: {}", outcome.notification);

    if let Some(e) = outcome.replication.error() {
        eprintln!("Warning: {}", e);
    }
    if let Some(e) = outcome.notification.error() {
        eprintln!("Warning: {}", e);
    }
}

/// Format backups as a table
pub fn format_backup_table(backups: &[BackupInfo], long: bool) -> String {
    let mut builder = Builder::default();

    let mut header: Vec<String> = ["#", "Name", "Kind", "Created", "Size", "Sealed"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    if long {
        header.push("Path".to_string());
    }
    builder.push_record(header);

    for (i, backup) in backups.iter().enumerate() {
        let mut row = vec![
            (i + 1).to_string(),
            backup.filename.clone(),
            backup.kind.to_string(),
            backup.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_size(backup.size_bytes),
            if backup.sealed { "yes" } else { "NO" }.to_string(),
        ];
        if long {
            row.push(backup.path.display().to_string());
        }
        builder.push_record(row);
    }

    let mut table = builder.build();
    table.with(Style::psql());
    table.to_string()
}
