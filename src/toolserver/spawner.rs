//! Tool server command construction.
//!
//! Builds the [`tokio::process::Command`] for the configured MCP server with:
//! - `kill_on_drop(true)` so the process is cleaned up if the supervisor is
//!   dropped without an explicit terminate.
//! - piped stdin/stdout/stderr.
//! - either the inherited environment or `env_clear()` plus a safe
//!   allowlist, followed by the configured extra variables.
//! - an existence check for path-like executables so a missing binary fails
//!   fast with [`AppError::ProcessSpawn`] instead of at first write.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Environment variables kept when `inherit_env = false`.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TMPDIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Build the command that launches the tool server.
///
/// # Errors
///
/// Returns [`AppError::ProcessSpawn`] if the executable is a path that does
/// not exist or is not a file.
pub fn build_command(config: &ServerConfig) -> Result<Command> {
    check_executable(&config.executable)?;

    let mut cmd = Command::new(&config.executable);
    cmd.args(&config.args);

    if !config.inherit_env {
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
    }
    cmd.envs(&config.env);

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    Ok(cmd)
}

/// Reject path-like executables that are absent; bare names go through `PATH`.
fn check_executable(executable: &Path) -> Result<()> {
    let path_like = executable.is_absolute() || executable.components().count() > 1;
    if path_like && !executable.is_file() {
        return Err(AppError::ProcessSpawn(format!(
            "executable not found: {}",
            executable.display()
        )));
    }
    Ok(())
}
