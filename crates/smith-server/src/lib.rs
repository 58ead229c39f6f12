//! Protocol server and runtime for the Smith agent.
//!
//! [`server::ProtocolServer`] speaks the controller protocol over
//! authenticated WebSocket connections; [`runtime::run`] wires the whole
//! agent together and handles shutdown signals; [`stats::collect_stats`]
//! samples the machine for liveness probes.

pub mod runtime;
pub mod server;
pub mod stats;

pub use runtime::run;
pub use server::ProtocolServer;
pub use stats::collect_stats;
