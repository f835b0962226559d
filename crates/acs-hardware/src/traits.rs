//! Collaborator interfaces consumed by the terminal core.
//!
//! Each peripheral is reached through a narrow trait. Methods return
//! `impl Future + Send` so that code generic over a board can hand its
//! peripherals to spawned Tokio tasks; implementors are free to write the
//! methods as plain `async fn`.
//!
//! Input devices that are polled from a single task take `&mut self`.
//! Output devices take `&self` so they can be shared behind an `Arc` between
//! the state-machine dispatcher and the network session.

use crate::error::Result;
use crate::types::{IndicatorPattern, SoundEffect, SwitchReading};
use acs_core::{CredentialId, Tone};
use std::future::Future;

/// RF credential reader.
pub trait CredentialReader: Send + Sync {
    /// Poll the field once.
    ///
    /// `Ok(None)` means nothing answered. An error with
    /// [`is_card_read`](crate::HardwareError::is_card_read) set means a
    /// credential was in the field but could not be read.
    fn poll(&mut self) -> impl Future<Output = Result<Option<CredentialId>>> + Send;
}

/// The two tamper-detect switches at the credential slot.
pub trait TamperSwitches: Send + Sync {
    fn read(&mut self) -> impl Future<Output = Result<SwitchReading>> + Send;
}

/// Door or turnstile release.
pub trait Actuator: Send + Sync {
    fn set_engaged(&self, engaged: bool) -> impl Future<Output = Result<()>> + Send;
}

/// LED ring.
pub trait Indicator: Send + Sync {
    fn show(&self, pattern: IndicatorPattern) -> impl Future<Output = Result<()>> + Send;
}

/// Buzzer or speaker.
pub trait Sounder: Send + Sync {
    fn play_effect(&self, effect: SoundEffect) -> impl Future<Output = Result<()>> + Send;

    fn play_tone(&self, tone: &Tone) -> impl Future<Output = Result<()>> + Send;
}

pub trait TemperatureSensor: Send + Sync {
    /// Board temperature in degrees Celsius.
    fn read_celsius(&mut self) -> impl Future<Output = Result<f32>> + Send;
}

/// The single front-panel button.
pub trait Button: Send + Sync {
    fn is_pressed(&mut self) -> impl Future<Output = Result<bool>> + Send;
}

/// Firmware update mechanism. Download and flashing happen behind this call.
pub trait FirmwareUpdater: Send + Sync {
    fn begin(&self, tag: &str) -> impl Future<Output = Result<()>> + Send;
}

pub trait SystemControl: Send + Sync {
    fn reboot(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A concrete set of peripheral types.
///
/// Lets runtime code stay generic over one parameter instead of nine.
pub trait Board: Send + 'static {
    type Reader: CredentialReader + 'static;
    type Switches: TamperSwitches + 'static;
    type Actuator: Actuator + 'static;
    type Indicator: Indicator + 'static;
    type Sounder: Sounder + 'static;
    type Thermometer: TemperatureSensor + 'static;
    type Button: Button + 'static;
    type Updater: FirmwareUpdater + 'static;
    type System: SystemControl + 'static;
}

/// Every peripheral of one board, ready to be handed to the runtime.
pub struct Peripherals<B: Board> {
    pub reader: B::Reader,
    pub switches: B::Switches,
    pub actuator: B::Actuator,
    pub indicator: B::Indicator,
    pub sounder: B::Sounder,
    pub thermometer: B::Thermometer,
    pub button: B::Button,
    pub updater: B::Updater,
    pub system: B::System,
}
