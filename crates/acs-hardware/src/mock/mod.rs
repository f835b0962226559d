//! Controllable peripherals for tests and the emulator.
//!
//! [`mock_peripherals`] builds a full [`Peripherals`] set together with the
//! [`MockControls`] that drive its inputs and observe its outputs.

pub mod inputs;
pub mod outputs;
pub mod reader;

pub use inputs::{MockButton, MockButtonHandle, MockThermometer, MockThermometerHandle};
pub use outputs::{
    MockActuator, MockIndicator, MockOutputs, MockSounder, MockSystem, MockUpdater, OutputEvent,
};
pub use reader::{MockCardHandle, MockReader, MockSwitches, card_slot};

use crate::traits::{Board, Peripherals};

/// Board made entirely of mocks.
#[derive(Debug)]
pub struct MockBoard;

impl Board for MockBoard {
    type Reader = MockReader;
    type Switches = MockSwitches;
    type Actuator = MockActuator;
    type Indicator = MockIndicator;
    type Sounder = MockSounder;
    type Thermometer = MockThermometer;
    type Button = MockButton;
    type Updater = MockUpdater;
    type System = MockSystem;
}

/// Handles for everything on a [`MockBoard`].
#[derive(Debug)]
pub struct MockControls {
    pub card: MockCardHandle,
    pub button: MockButtonHandle,
    pub thermometer: MockThermometerHandle,
    pub outputs: MockOutputs,
}

pub fn mock_peripherals() -> (Peripherals<MockBoard>, MockControls) {
    let (reader, switches, card) = reader::card_slot();
    let (button, button_handle) = inputs::button();
    let (thermometer, thermometer_handle) = inputs::thermometer();
    let (tx, outputs) = outputs::outputs();

    let peripherals = Peripherals {
        reader,
        switches,
        actuator: MockActuator { tx: tx.clone() },
        indicator: MockIndicator { tx: tx.clone() },
        sounder: MockSounder { tx: tx.clone() },
        thermometer,
        button,
        updater: MockUpdater { tx: tx.clone() },
        system: MockSystem { tx },
    };

    let controls = MockControls {
        card,
        button: button_handle,
        thermometer: thermometer_handle,
        outputs,
    };

    (peripherals, controls)
}
