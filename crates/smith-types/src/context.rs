//! Per-connection view of the effective policy handed to each tool.

use std::path::PathBuf;

use crate::config::AgentConfig;

/// Tool category tags. The first four are toggleable via config; the rest
/// always load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Filesystem,
    Shell,
    Git,
    Network,
    Processes,
    Packages,
    System,
    Browser,
}

impl ToolCategory {
    /// Wire/config name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::Shell => "shell",
            ToolCategory::Git => "git",
            ToolCategory::Network => "network",
            ToolCategory::Processes => "processes",
            ToolCategory::Packages => "packages",
            ToolCategory::System => "system",
            ToolCategory::Browser => "browser",
        }
    }
}

/// The derived, read-only value object every tool handler receives.
///
/// Carries the confinement root, policy layers, and effective timeout.
/// Built once from [`AgentConfig`] and never mutated.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Working directory for relative paths and subprocesses (= sandbox root).
    pub working_dir: PathBuf,
    /// The confinement root every path must resolve inside.
    pub sandbox_dir: PathBuf,
    /// Destructive operations are refused when set.
    pub readonly_mode: bool,
    /// Allowed shell binary base-names; empty = unrestricted.
    pub allowed_commands: Vec<String>,
    /// Default per-invocation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Category enables for the toggleable categories.
    pub filesystem_enabled: bool,
    pub shell_enabled: bool,
    pub git_enabled: bool,
    pub network_enabled: bool,
}

impl ToolContext {
    /// Derive the context from the loaded agent configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            working_dir: config.sandbox_dir.clone(),
            sandbox_dir: config.sandbox_dir.clone(),
            readonly_mode: config.readonly_mode,
            allowed_commands: config.allowed_shell_commands.clone(),
            timeout_ms: config.timeout_ms,
            filesystem_enabled: config.enable_filesystem,
            shell_enabled: config.enable_shell,
            git_enabled: config.enable_git,
            network_enabled: config.enable_network,
        }
    }

    /// Whether the given category is enabled under this context.
    /// Non-toggleable categories are always on.
    pub fn category_enabled(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::Filesystem => self.filesystem_enabled,
            ToolCategory::Shell => self.shell_enabled,
            ToolCategory::Git => self.git_enabled,
            ToolCategory::Network => self.network_enabled,
            ToolCategory::Processes
            | ToolCategory::Packages
            | ToolCategory::System
            | ToolCategory::Browser => true,
        }
    }

    /// Names of all enabled categories, in catalog order.
    pub fn enabled_categories(&self) -> Vec<String> {
        [
            ToolCategory::Filesystem,
            ToolCategory::Shell,
            ToolCategory::Git,
            ToolCategory::Network,
            ToolCategory::Processes,
            ToolCategory::Packages,
            ToolCategory::System,
            ToolCategory::Browser,
        ]
        .iter()
        .filter(|c| self.category_enabled(**c))
        .map(|c| c.as_str().to_string())
        .collect()
    }
}
