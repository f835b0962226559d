//! Shared domain types for the access-control terminal.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod queue;
pub mod timer;
pub mod types;

pub use config::TerminalConfig;
pub use error::{Error, Result};
pub use events::{TerminalCommand, TerminalRequest};
pub use timer::{TimerFired, TimerService};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
