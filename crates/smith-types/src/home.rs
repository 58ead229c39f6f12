//! The agent's persisted home directory.
//!
//! A single directory holds everything Smith persists between runs: the PID
//! file, the auth-token file, the logs directory, and the browser profile
//! cache. Defaults to `~/.smith`, overridable via `SMITH_HOME`.

use std::path::PathBuf;

use crate::SmithError;

/// Resolve the agent home directory.
pub fn smith_home() -> PathBuf {
    if let Ok(dir) = std::env::var("SMITH_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".smith")
}

/// Path of the PID file (integer text).
pub fn pid_path(home: &std::path::Path) -> PathBuf {
    home.join("smith.pid")
}

/// Path of the persisted auth-token file (UTF-8 text).
pub fn token_path(home: &std::path::Path) -> PathBuf {
    home.join("auth_token")
}

/// Directory for log files.
pub fn logs_dir(home: &std::path::Path) -> PathBuf {
    home.join("logs")
}

/// Directory for the headless-browser profile cache.
pub fn browser_cache_dir(home: &std::path::Path) -> PathBuf {
    home.join("browser-cache")
}

/// Create the home directory layout if missing.
pub fn ensure_home(home: &std::path::Path) -> Result<(), SmithError> {
    for dir in [home.to_path_buf(), logs_dir(home), browser_cache_dir(home)] {
        std::fs::create_dir_all(&dir).map_err(|e| {
            SmithError::Config(format!("failed to create {}: {e}", dir.display()))
        })?;
    }
    Ok(())
}
