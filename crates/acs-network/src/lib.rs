//! Backend communication for the access-control terminal.
//!
//! # Components
//!
//! - **TcpClient**: newline-delimited JSON transport to the backend
//! - **AuthCoordinator**: sans-IO session and authorization state machine
//! - **NetworkSession**: async driver owning the client, the coordinator and
//!   its timers
//!
//! # Example
//!
//! ```no_run
//! use acs_network::{CoordinatorConfig, NetworkSession, TcpClientConfig};
//! # use acs_network::{DeviceServices, TerminalSnapshot};
//! # use acs_core::{TerminalCommand, Tone};
//! # struct Services;
//! # impl DeviceServices for Services {
//! #     async fn snapshot(&self) -> Option<TerminalSnapshot> { None }
//! #     async fn button_held(&self) -> bool { false }
//! #     async fn deliver(&self, _: TerminalCommand) {}
//! #     async fn store_tone(&self, _: Tone) {}
//! #     async fn play_tone(&self) {}
//! #     async fn begin_firmware_update(&self, _: String) {}
//! #     async fn reboot(&self) {}
//! #     async fn set_online(&self, _: bool) {}
//! # }
//!
//! # async fn example() {
//! let (_requests_tx, requests_rx) = tokio::sync::mpsc::channel(8);
//! let session = NetworkSession::new(
//!     TcpClientConfig::default(),
//!     CoordinatorConfig::default(),
//!     requests_rx,
//!     Services,
//! );
//! tokio::spawn(session.run());
//! # }
//! ```

mod client;
pub mod coordinator;
mod session;

pub use client::{TcpClient, TcpClientConfig, TcpClientError};
pub use coordinator::{
    AuthCoordinator, CoordinatorAction, CoordinatorConfig, CoordinatorEvent, NetTimer,
    PendingAuthorization,
};
pub use session::{DeviceServices, NetworkSession, TerminalSnapshot};
