//! Configuration loading: file, `SMITH_*` environment overrides, and auth
//! token resolution.
//!
//! The priority chain (later overrides earlier):
//! 1. `smith.toml` (explicit path, else working directory, else home dir)
//! 2. `SMITH_*` environment variables
//!
//! After merging, the auth token is resolved: an explicit value wins; else
//! the persisted token file under the home directory; else a fresh UUIDv4
//! is generated and persisted to that file. The loaded config therefore
//! always carries a non-empty token.

use std::path::{Path, PathBuf};

use crate::config::{AgentConfig, CONFIG_FILENAME};
use crate::home;
use crate::SmithError;

/// Maximum config file size. Larger files are rejected rather than parsed.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Environment variables recognized as overrides, paired with the config
/// field they set.
const ENV_OVERRIDES: &[&str] = &[
    "SMITH_NAME",
    "SMITH_PORT",
    "SMITH_AUTH_TOKEN",
    "SMITH_SANDBOX_DIR",
    "SMITH_READONLY_MODE",
    "SMITH_ALLOWED_SHELL_COMMANDS",
    "SMITH_TIMEOUT_MS",
    "SMITH_MAX_CONCURRENT_TASKS",
    "SMITH_IDLE_TIMEOUT_MS",
    "SMITH_LOG_LEVEL",
];

/// Load the effective configuration.
///
/// `config_path` forces a specific file; when `None`, `./smith.toml` is
/// tried first, then `<home>/smith.toml`. A missing file is not an error
/// as long as the environment supplies `SMITH_NAME` and `SMITH_SANDBOX_DIR`.
pub fn load_config(config_path: Option<&Path>, home_dir: &Path) -> Result<AgentConfig, SmithError> {
    let mut config = match locate_config_file(config_path, home_dir) {
        Some(path) => {
            let content = read_config_file(&path)?;
            tracing::debug!(path = %path.display(), "loading config file");
            AgentConfig::from_toml(&content)?
        }
        None => {
            // Environment-only bootstrap; name and sandbox must come from env.
            let name = std::env::var("SMITH_NAME")
                .map_err(|_| SmithError::Config("no smith.toml found and SMITH_NAME unset".into()))?;
            let sandbox = std::env::var("SMITH_SANDBOX_DIR").map_err(|_| {
                SmithError::Config("no smith.toml found and SMITH_SANDBOX_DIR unset".into())
            })?;
            AgentConfig::default_for(&name, PathBuf::from(sandbox))
        }
    };

    apply_env_overrides(&mut config)?;
    resolve_auth_token(&mut config, home_dir)?;
    config.validate()?;
    Ok(config)
}

fn locate_config_file(config_path: Option<&Path>, home_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = config_path {
        return Some(path.to_path_buf());
    }
    let cwd_candidate = PathBuf::from(CONFIG_FILENAME);
    if cwd_candidate.exists() {
        return Some(cwd_candidate);
    }
    let home_candidate = home_dir.join(CONFIG_FILENAME);
    if home_candidate.exists() {
        return Some(home_candidate);
    }
    None
}

fn read_config_file(path: &Path) -> Result<String, SmithError> {
    let meta = std::fs::metadata(path)
        .map_err(|e| SmithError::Config(format!("cannot stat {}: {e}", path.display())))?;
    if meta.len() > MAX_CONFIG_FILE_SIZE {
        return Err(SmithError::Config(format!(
            "config file {} exceeds {MAX_CONFIG_FILE_SIZE} bytes",
            path.display()
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| SmithError::Config(format!("cannot read {}: {e}", path.display())))
}

/// Apply `SMITH_*` environment overrides on top of the file values.
///
/// Each applied override is logged with its source variable so operators
/// can see where a value came from.
fn apply_env_overrides(config: &mut AgentConfig) -> Result<(), SmithError> {
    for &var in ENV_OVERRIDES {
        let Ok(raw) = std::env::var(var) else { continue };
        if raw.is_empty() {
            continue;
        }
        match var {
            "SMITH_NAME" => config.name = raw.clone(),
            "SMITH_PORT" => config.port = parse_env(var, &raw)?,
            "SMITH_AUTH_TOKEN" => config.auth_token = raw.clone(),
            "SMITH_SANDBOX_DIR" => config.sandbox_dir = PathBuf::from(&raw),
            "SMITH_READONLY_MODE" => config.readonly_mode = parse_bool(var, &raw)?,
            "SMITH_ALLOWED_SHELL_COMMANDS" => {
                config.allowed_shell_commands = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "SMITH_TIMEOUT_MS" => config.timeout_ms = parse_env(var, &raw)?,
            "SMITH_MAX_CONCURRENT_TASKS" => config.max_concurrent_tasks = parse_env(var, &raw)?,
            "SMITH_IDLE_TIMEOUT_MS" => config.idle_timeout_ms = Some(parse_env(var, &raw)?),
            "SMITH_LOG_LEVEL" => config.log_level = raw.clone(),
            _ => unreachable!("unhandled override {var}"),
        }
        tracing::debug!(source = var, "config value overridden from environment");
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, SmithError> {
    raw.parse()
        .map_err(|_| SmithError::Config(format!("{var}: cannot parse {raw:?}")))
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, SmithError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SmithError::Config(format!("{var}: cannot parse {raw:?} as bool"))),
    }
}

/// Resolve the auth token: explicit config value, then the persisted token
/// file, then a freshly generated UUID persisted for subsequent runs.
fn resolve_auth_token(config: &mut AgentConfig, home_dir: &Path) -> Result<(), SmithError> {
    if !config.auth_token.is_empty() {
        return Ok(());
    }

    let token_file = home::token_path(home_dir);
    if let Ok(persisted) = std::fs::read_to_string(&token_file) {
        let persisted = persisted.trim();
        if !persisted.is_empty() {
            config.auth_token = persisted.to_string();
            return Ok(());
        }
    }

    let generated = uuid::Uuid::new_v4().to_string();
    if let Some(parent) = token_file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SmithError::Config(format!("cannot create {}: {e}", parent.display())))?;
    }
    std::fs::write(&token_file, &generated)
        .map_err(|e| SmithError::Config(format!("cannot persist auth token: {e}")))?;
    tracing::info!(path = %token_file.display(), "generated and persisted new auth token");
    config.auth_token = generated;
    Ok(())
}
