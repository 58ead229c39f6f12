//! Shared types for the Smith remote execution agent.
//!
//! This crate holds everything the other Smith crates agree on: the agent
//! configuration and its loader, the error taxonomy, the wire protocol
//! frames, the per-connection [`ToolContext`], and the home-directory
//! layout.

pub mod config;
pub mod config_loader;
pub mod context;
pub mod error;
pub mod home;
pub mod protocol;

pub use config::{AgentConfig, CONFIG_FILENAME, DEFAULT_PORT};
pub use config_loader::load_config;
pub use context::{ToolCategory, ToolContext};
pub use error::SmithError;
pub use protocol::{
    DevkitReport, Inbound, Outbound, SystemStats, TaskPayload, TaskProgress, ToolResult,
    MAX_FRAME_BYTES, PROTOCOL_VERSION,
};
