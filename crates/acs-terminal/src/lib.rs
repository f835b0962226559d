//! Access-control terminal core.
//!
//! - [`AccessStateMachine`]: the terminal's finite-state controller, free of
//!   I/O, turning events into [`SideEffect`]s
//! - [`CardPresenceMonitor`]: credential presence with swap detection
//! - [`ButtonClassifier`] and [`TemperatureGuard`]: local inputs
//! - [`SharedStatus`]: lock-guarded status read across tasks
//! - [`Terminal`]: spawns all of the above, plus the network session, on a
//!   board's peripherals
//!
//! # Example
//!
//! ```no_run
//! use acs_core::TerminalConfig;
//! use acs_hardware::mock::mock_peripherals;
//! use acs_storage::{Database, DeviceSettings, SqliteSettingsRepository};
//! use acs_terminal::Terminal;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TerminalConfig::load("acs.toml")?;
//! let db = Database::in_memory().await?;
//! let settings = DeviceSettings::new(SqliteSettingsRepository::new(db.pool().clone()));
//! let (peripherals, _controls) = mock_peripherals();
//!
//! let handle = Terminal::new(config, peripherals, settings).start().await?;
//! println!("state: {}", handle.status().state().await?);
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod button;
pub mod presence;
pub mod runtime;
pub mod shared;
pub mod state_machine;
pub mod temperature;

pub use button::ButtonClassifier;
pub use presence::{CardPresenceMonitor, PollSample, PresenceEvent, ReadOutcome};
pub use runtime::{DispatchEvent, Terminal, TerminalHandle};
pub use shared::{SharedStatus, StatusSnapshot};
pub use state_machine::{
    AccessStateMachine, AccessStateMachineBuilder, ButtonEvent, MachineEvent, MachineTimings,
    SideEffect, StateTimer, StateTransition,
};
pub use temperature::TemperatureGuard;
