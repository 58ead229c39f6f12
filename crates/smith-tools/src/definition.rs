//! Core tool abstraction: the [`Tool`] trait and its argument descriptors.
//!
//! Every action the agent can run implements [`Tool`]. The trait is
//! `Send + Sync` so tools can be stored in a shared set and called from any
//! async task. Handlers return plain typed values; the executor performs
//! the result-envelope conversion.

use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::ArgSpec;

/// Maximum allowed length for a tool name.
const MAX_TOOL_NAME_LEN: usize = 64;

/// A named, argument-checked action executed on the agent host.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (lowercase alphanumeric + underscores, max 64 chars).
    fn name(&self) -> &str;

    /// The category the tool belongs to; drives enable/disable gating.
    fn category(&self) -> ToolCategory;

    /// Short description of what the tool does.
    fn description(&self) -> &str;

    /// Declarative argument descriptors validated by the executor before
    /// the handler runs.
    fn arg_specs(&self) -> &'static [ArgSpec];

    /// Timeout base for this tool when the caller does not pass
    /// `timeout_ms`. `None` means the context default applies.
    fn default_timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Run the tool. The returned value becomes the result envelope's
    /// `data` field; errors become `success: false` results.
    async fn execute(
        &self,
        args: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, SmithError>;
}

/// Validate a tool name: non-empty, bounded, lowercase alnum + underscore.
pub fn validate_tool_name(name: &str) -> Result<(), SmithError> {
    if name.is_empty() {
        return Err(SmithError::Internal("tool name must not be empty".into()));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(SmithError::Internal(format!(
            "tool name exceeds {MAX_TOOL_NAME_LEN} characters: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(SmithError::Internal(format!(
            "tool name must be lowercase alphanumeric/underscore: {name}"
        )));
    }
    Ok(())
}
