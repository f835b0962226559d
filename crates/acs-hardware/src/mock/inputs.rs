//! Simulated front-panel button and temperature sensor.

use crate::error::Result;
use crate::traits::{Button, TemperatureSensor};
use std::sync::Arc;
use tokio::sync::watch;

/// Room temperature the mock thermometer starts at.
pub const MOCK_AMBIENT_C: f32 = 25.0;

pub fn button() -> (MockButton, MockButtonHandle) {
    let (tx, rx) = watch::channel(false);
    (
        MockButton { pressed: rx },
        MockButtonHandle {
            pressed: Arc::new(tx),
        },
    )
}

pub fn thermometer() -> (MockThermometer, MockThermometerHandle) {
    let (tx, rx) = watch::channel(MOCK_AMBIENT_C);
    (
        MockThermometer { celsius: rx },
        MockThermometerHandle {
            celsius: Arc::new(tx),
        },
    )
}

#[derive(Debug)]
pub struct MockButton {
    pressed: watch::Receiver<bool>,
}

impl Button for MockButton {
    async fn is_pressed(&mut self) -> Result<bool> {
        Ok(*self.pressed.borrow())
    }
}

#[derive(Debug, Clone)]
pub struct MockButtonHandle {
    pressed: Arc<watch::Sender<bool>>,
}

impl MockButtonHandle {
    pub fn press(&self) {
        self.pressed.send_replace(true);
    }

    pub fn release(&self) {
        self.pressed.send_replace(false);
    }

    pub fn is_pressed(&self) -> bool {
        *self.pressed.borrow()
    }
}

#[derive(Debug)]
pub struct MockThermometer {
    celsius: watch::Receiver<f32>,
}

impl TemperatureSensor for MockThermometer {
    async fn read_celsius(&mut self) -> Result<f32> {
        Ok(*self.celsius.borrow())
    }
}

#[derive(Debug, Clone)]
pub struct MockThermometerHandle {
    celsius: Arc<watch::Sender<f32>>,
}

impl MockThermometerHandle {
    pub fn set(&self, celsius: f32) {
        self.celsius.send_replace(celsius);
    }
}
