//! Configuration types for Smith agent instances.
//!
//! [`AgentConfig`] is the top-level configuration loaded from `smith.toml`,
//! controlling the listen port, auth token, sandbox confinement, security
//! policy layers, and timeouts. Immutable after load.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::SmithError;

/// Default listen port for the agent.
pub const DEFAULT_PORT: u16 = 7900;

/// Default per-invocation timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cap on in-flight tool executions.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

/// Config file name looked up in the working directory and the home dir.
pub const CONFIG_FILENAME: &str = "smith.toml";

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration for a Smith agent instance.
///
/// Read-only after load; every component receives it behind an `Arc` and
/// never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Short instance id. Must match `^[a-z0-9][a-z0-9_-]*$`.
    pub name: String,

    /// TCP port the protocol server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Opaque token the controller must present verbatim on handshake.
    /// Always present at runtime; the loader generates and persists one
    /// when neither the config nor the token file supplies it.
    #[serde(default)]
    pub auth_token: String,

    /// Absolute path of the confinement root. Every filesystem operation
    /// must resolve inside it.
    pub sandbox_dir: PathBuf,

    /// When true, destructive filesystem and git actions are refused.
    #[serde(default)]
    pub readonly_mode: bool,

    /// Allowed shell binary base-names. Empty = unrestricted.
    #[serde(default)]
    pub allowed_shell_commands: Vec<String>,

    /// Category enables for the four toggleable tool categories.
    #[serde(default = "default_true")]
    pub enable_filesystem: bool,
    #[serde(default = "default_true")]
    pub enable_shell: bool,
    #[serde(default = "default_true")]
    pub enable_git: bool,
    #[serde(default = "default_true")]
    pub enable_network: bool,

    /// Default per-invocation timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Cap on in-flight tool executions across all connections.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Close connections with no traffic for this long. `None` disables
    /// idle eviction.
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,

    /// PEM certificate chain; the listener is TLS-wrapped when both
    /// `tls_cert` and `tls_key` are set.
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key.
    #[serde(default)]
    pub tls_key: Option<PathBuf>,

    /// Log level passed to the tracing filter (`error`..`trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AgentConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, SmithError> {
        toml::from_str(content).map_err(|e| SmithError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, SmithError> {
        toml::to_string_pretty(self).map_err(|e| SmithError::Config(e.to_string()))
    }

    /// Create a default configuration for a named agent with the given
    /// sandbox directory.
    pub fn default_for(name: &str, sandbox_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            port: DEFAULT_PORT,
            auth_token: String::new(),
            sandbox_dir,
            readonly_mode: false,
            allowed_shell_commands: Vec::new(),
            enable_filesystem: true,
            enable_shell: true,
            enable_git: true,
            enable_network: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            idle_timeout_ms: None,
            tls_cert: None,
            tls_key: None,
            log_level: default_log_level(),
        }
    }

    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), SmithError> {
        if !valid_name(&self.name) {
            return Err(SmithError::Config(format!(
                "invalid agent name {:?}: must match ^[a-z0-9][a-z0-9_-]*$",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(SmithError::Config("port must be 1..65535".into()));
        }
        if self.sandbox_dir.as_os_str().is_empty() {
            return Err(SmithError::Config("sandbox_dir must be set".into()));
        }
        if !self.sandbox_dir.is_absolute() {
            return Err(SmithError::Config(format!(
                "sandbox_dir must be absolute, got {:?}",
                self.sandbox_dir
            )));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(SmithError::Config(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(SmithError::Config(
                "tls_cert and tls_key must be set together".into(),
            ));
        }
        Ok(())
    }
}

/// Check an agent name against `^[a-z0-9][a-z0-9_-]*$`.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
