//! Browser-layer errors.

use smith_types::SmithError;

/// Errors from the CDP client and browser host.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// No usable browser binary was found on the host.
    #[error("no browser binary found (tried {0})")]
    NoBinary(String),

    /// The browser process started but never exposed a debuggable target.
    #[error("browser did not become ready: {0}")]
    NotReady(String),

    /// WebSocket connection to the DevTools endpoint failed.
    #[error("cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A CDP command returned an error object.
    #[error("CDP error {code}: {message}")]
    Cdp { code: i64, message: String },

    /// A CDP command did not answer in time.
    #[error("CDP command {method} timed out")]
    Timeout { method: String },

    /// Wire-level protocol failure.
    #[error("CDP protocol error: {0}")]
    Protocol(String),
}

impl From<BrowserError> for SmithError {
    fn from(e: BrowserError) -> Self {
        SmithError::ToolFailure(e.to_string())
    }
}
