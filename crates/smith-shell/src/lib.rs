//! OS-abstracting subprocess layer for the Smith agent.
//!
//! Everything that spawns a process goes through [`ShellAdapter`]: uniform
//! output capture, wall-clock timeouts with process-tree termination, and
//! credential-scrubbed environments.

pub mod adapter;
pub mod env;
pub mod kill_tree;

pub use adapter::{Platform, RunOptions, RunResult, ShellAdapter};
pub use env::sanitize_env;
pub use kill_tree::kill_tree;
