//! Headless-browser layer of the Smith agent.
//!
//! A single [`BrowserHost`] serves every browser tool call on the agent,
//! with idle eviction after five minutes; [`search`] implements the
//! deterministic web-search ranking used by `browser_search`.

pub mod cdp;
pub mod driver;
pub mod error;
pub mod host;
pub mod search;
pub mod tools;

pub use error::BrowserError;
pub use host::{BrowserHost, IDLE_EVICTION};
pub use tools::tools as browser_tools;
