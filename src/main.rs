use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tarseal::cli::{handle_backup_command, BackupCommands};
use tarseal::config::{paths::BackupPaths, settings::Settings};

#[derive(Parser)]
#[command(
    name = "tarseal",
    author = "Kaylee Beyene",
    version,
    about = "Encrypted full and incremental directory backups",
    long_about = "tarseal archives a directory tree as tar.gz, seals the archive with \
                  AES-256-GCM under an Argon2id-derived key, copies it to a remote \
                  destination and reports the outcome. Incremental backups only store \
                  what changed since the previous incremental run."
)]
struct Cli {
    /// Base directory for configuration and backups
    #[arg(long, global = true, env = "TARSEAL_HOME")]
    home: Option<PathBuf>,

    /// Read the passphrase from the first line of this file
    #[arg(long, global = true)]
    passphrase_file: Option<PathBuf>,

    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the base and backup directories and a default config file
    Init,

    /// Show current configuration and paths
    Config,

    #[command(flatten)]
    Backup(BackupCommands),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Initialize paths and settings
    let paths = match cli.home {
        Some(home) => BackupPaths::with_base_dir(home),
        None => BackupPaths::new()?,
    };
    let settings = Settings::load_or_create(&paths)?;
    let paths = paths.with_backup_dir(settings.backup_dir.clone());

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing tarseal at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            if paths.is_initialized() {
                println!("Config file already exists: {}", paths.settings_file().display());
            } else {
                settings.save(&paths)?;
                println!("Wrote default config: {}", paths.settings_file().display());
            }
            println!("Backup directory: {}", paths.backup_dir().display());
            println!();
            println!(
                "Set {} or passphrase_file in the config before your first backup.",
                tarseal::cli::PASSPHRASE_ENV_VAR
            );
        }
        Some(Commands::Config) => {
            println!("tarseal Configuration");
            println!("=====================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Config file:      {}", paths.settings_file().display());
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Snapshot state:   {}", paths.snapshot_file().display());
            println!();
            println!("Settings:");
            println!(
                "  Remote destination: {}",
                display_or_none(&settings.remote_destination)
            );
            println!("  Replicator:         {}", settings.replicator);
            println!(
                "  Recipient:          {}",
                display_or_none(&settings.notification_recipient)
            );
            println!("  Notifier:           {}", settings.notifier);
            println!(
                "  Passphrase:         {}",
                if settings.passphrase.is_some() {
                    "set in config (redacted)".to_string()
                } else if let Some(file) = &settings.passphrase_file {
                    format!("read from {}", file.display())
                } else {
                    "not configured".to_string()
                }
            );
            println!(
                "  Argon2:             {} KiB, {} passes, {} lanes",
                settings.kdf.memory_cost, settings.kdf.time_cost, settings.kdf.parallelism
            );
        }
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&paths, &settings, cli.passphrase_file.as_deref(), cmd)?;
        }
        None => {
            println!("tarseal - encrypted directory backups");
            println!();
            println!("Run 'tarseal --help' for usage information.");
        }
    }

    Ok(())
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "(none)"
    } else {
        value
    }
}
