//! Peripheral abstraction layer for the access-control terminal.
//!
//! The terminal core never touches GPIO, SPI or audio hardware directly. It
//! talks to narrow collaborator traits ([`traits`]) grouped per board
//! ([`Board`]), and ships mock implementations ([`mock`]) that the tests and
//! the emulator binary drive programmatically.
//!
//! ```no_run
//! use acs_hardware::traits::{CredentialReader, Indicator};
//! use acs_hardware::types::IndicatorPattern;
//! use acs_hardware::Result;
//!
//! async fn show_presence<R: CredentialReader, I: Indicator>(
//!     reader: &mut R,
//!     indicator: &I,
//! ) -> Result<()> {
//!     if reader.poll().await?.is_some() {
//!         indicator.show(IndicatorPattern::AwaitAuth).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::{
    Actuator, Board, Button, CredentialReader, FirmwareUpdater, Indicator, Peripherals, Sounder,
    SystemControl, TamperSwitches, TemperatureSensor,
};
pub use types::{IndicatorPattern, SoundEffect, SwitchReading};
