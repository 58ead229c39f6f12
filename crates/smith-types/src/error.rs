//! Error types shared across all Smith crates.

/// Errors that can occur across the Smith runtime.
///
/// Tool-level variants become `success: false` task results; the display
/// string is what the controller sees in the result's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum SmithError {
    /// Requested tool is not present in the enabled set.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments failed validation against the tool's descriptors.
    #[error("invalid arguments: {0}")]
    BadArguments(String),

    /// A path argument resolved outside the sandbox root.
    #[error("path is outside the sandbox: {0}")]
    SandboxViolation(String),

    /// A destructive operation was attempted while read-only mode is on.
    #[error("operation refused: agent is in read-only mode ({0})")]
    ReadOnlyDenied(String),

    /// A shell binary is not present in `allowed_commands`.
    #[error("command not in allowed_commands: {0}")]
    NotAllowed(String),

    /// Execution exceeded the effective timeout.
    #[error("execution timed out after {0}ms")]
    Timeout(u64),

    /// The in-flight task cap is reached.
    #[error("agent busy: {0} tasks already in flight")]
    Busy(usize),

    /// Tool-specific runtime failure.
    #[error("{0}")]
    ToolFailure(String),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected failure; full detail goes to the log.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SmithError {
    /// Short machine-readable code for audit log lines.
    pub fn code(&self) -> &'static str {
        match self {
            SmithError::UnknownTool(_) => "unknown_tool",
            SmithError::BadArguments(_) => "bad_arguments",
            SmithError::SandboxViolation(_) => "sandbox_violation",
            SmithError::ReadOnlyDenied(_) => "readonly_denied",
            SmithError::NotAllowed(_) => "not_allowed",
            SmithError::Timeout(_) => "timeout",
            SmithError::Busy(_) => "busy",
            SmithError::ToolFailure(_) => "tool_failure",
            SmithError::Config(_) => "config",
            SmithError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for SmithError {
    fn from(e: std::io::Error) -> Self {
        SmithError::ToolFailure(e.to_string())
    }
}
