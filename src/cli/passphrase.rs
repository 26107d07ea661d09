//! Passphrase resolution
//!
//! There is no default passphrase. Sources are tried in order:
//! 1. `TARSEAL_PASSPHRASE` environment variable
//! 2. `--passphrase-file`
//! 3. `passphrase_file` setting
//! 4. `passphrase` setting
//! 5. Hidden prompt, when stdin is a terminal

use std::io::IsTerminal;
use std::path::Path;

use tracing::debug;

use crate::config::Settings;
use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult};

/// Environment variable holding the passphrase
pub const PASSPHRASE_ENV_VAR: &str = "TARSEAL_PASSPHRASE";

/// Resolve the passphrase for sealing or unsealing
pub fn resolve_passphrase(cli_file: Option<&Path>, settings: &Settings) -> BackupResult<SecureString> {
    let from_env = std::env::var(PASSPHRASE_ENV_VAR).ok().map(SecureString::from);
    let interactive = std::io::stdin().is_terminal();

    resolve_from(from_env, cli_file, settings, interactive, || {
        prompt_passphrase("Backup passphrase: ")
    })
}

fn resolve_from<F>(
    from_env: Option<SecureString>,
    cli_file: Option<&Path>,
    settings: &Settings,
    interactive: bool,
    prompt: F,
) -> BackupResult<SecureString>
where
    F: FnOnce() -> BackupResult<SecureString>,
{
    if let Some(passphrase) = from_env.filter(|p| !p.is_empty()) {
        debug!(source = PASSPHRASE_ENV_VAR, "using passphrase");
        return Ok(passphrase);
    }

    for file in [cli_file, settings.passphrase_file.as_deref()].into_iter().flatten() {
        let passphrase = read_passphrase_file(file)?;
        if !passphrase.is_empty() {
            debug!(source = %file.display(), "using passphrase");
            return Ok(passphrase);
        }
    }

    if let Some(passphrase) = settings.passphrase.as_deref().filter(|p| !p.is_empty()) {
        debug!(source = "settings", "using passphrase");
        return Ok(SecureString::from(passphrase));
    }

    if interactive {
        let passphrase = prompt()?;
        if !passphrase.is_empty() {
            return Ok(passphrase);
        }
    }

    Err(BackupError::Config(format!(
        "No passphrase available. Set {}, pass --passphrase-file, or set passphrase_file in the config file",
        PASSPHRASE_ENV_VAR
    )))
}

/// Read the first line of a passphrase file
fn read_passphrase_file(path: &Path) -> BackupResult<SecureString> {
    let contents = SecureString::from(std::fs::read_to_string(path).map_err(|e| {
        BackupError::Config(format!(
            "Failed to read passphrase file {}: {}",
            path.display(),
            e
        ))
    })?);

    let first_line = contents.lines().next().unwrap_or("");
    Ok(SecureString::from(first_line.trim_end_matches('\r')))
}

fn prompt_passphrase(prompt: &str) -> BackupResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| BackupError::Config(format!("Failed to read passphrase: {}", e)))
}
