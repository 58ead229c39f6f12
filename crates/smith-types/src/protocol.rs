//! Wire protocol frames exchanged with the controller.
//!
//! Every frame is a single JSON object with a `type` discriminator and
//! snake_case fields. Unknown fields on inbound frames are ignored;
//! unknown `type` values are surfaced as [`Inbound::Unknown`] so the
//! server can log a warning without dropping the connection.

use serde::{Deserialize, Serialize};

/// Protocol version advertised in the `register` frame and accepted in the
/// `x-smith-protocol-version` handshake header.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum accepted inbound frame size in bytes.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Payload of a `task` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Name of the tool to invoke.
    pub tool: String,
    /// Tool arguments, validated against the tool's descriptors.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Frames the controller sends to the agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Task {
        id: String,
        payload: TaskPayload,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    ConfigQuery,
    /// Any frame whose `type` is not recognized; produced by [`parse`](Self::parse).
    Unknown {
        kind: String,
    },
}

impl Inbound {
    /// Parse an inbound frame.
    ///
    /// A structurally valid JSON object with an unrecognized `type` yields
    /// [`Inbound::Unknown`]; anything else that fails to parse is an `Err`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "frame has no string \"type\" field".to_string())?
            .to_string();
        match kind.as_str() {
            "task" | "ping" | "config_query" => serde_json::from_value(value)
                .map_err(|e| format!("malformed {kind} frame: {e}")),
            _ => Ok(Inbound::Unknown { kind }),
        }
    }
}

/// The result envelope wrapped around every tool outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    /// Successful result carrying `data`.
    pub fn ok(data: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            duration_ms,
        }
    }

    /// Failed result carrying a non-empty error string.
    pub fn fail(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Progress notice sent once at the start of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
}

/// Machine stats returned by `pong` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: u32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub os: String,
    pub hostname: String,
    pub uptime_seconds: u64,
}

/// Effective policy snapshot returned by `config_report` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevkitReport {
    pub sandbox_dir: String,
    pub readonly_mode: bool,
    pub enabled_categories: Vec<String>,
}

/// Frames the agent sends to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Register {
        name: String,
        capabilities: Vec<String>,
        protocol_version: u32,
    },
    TaskProgress {
        id: String,
        progress: TaskProgress,
    },
    TaskResult {
        id: String,
        result: ToolResult,
    },
    Pong {
        stats: SystemStats,
    },
    ConfigReport {
        devkit: DevkitReport,
    },
}

impl Outbound {
    /// Serialize to the wire representation.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Serialization of these enums cannot fail in practice; keep the
            // connection alive with a self-describing internal error.
            format!(
                r#"{{"type":"task_result","id":"","result":{{"success":false,"error":"serialization failure: {e}","duration_ms":0,"data":null}}}}"#
            )
        })
    }
}
