//! Front-panel button gesture classification.

use acs_core::constants::BUTTON_HOLD_SAMPLES;

use crate::state_machine::ButtonEvent;

/// Turns periodic pressed/released samples into clicks and holds.
///
/// A press reaching [`BUTTON_HOLD_SAMPLES`] consecutive samples is reported
/// as [`ButtonEvent::Held`] once; its release is then
/// [`ButtonEvent::Released`]. A shorter press is a [`ButtonEvent::Click`].
#[derive(Debug, Clone)]
pub struct ButtonClassifier {
    pressed_samples: u32,
    hold_samples: u32,
    held: bool,
}

impl Default for ButtonClassifier {
    fn default() -> Self {
        Self::new(BUTTON_HOLD_SAMPLES)
    }
}

impl ButtonClassifier {
    pub fn new(hold_samples: u32) -> Self {
        Self {
            pressed_samples: 0,
            hold_samples: hold_samples.max(1),
            held: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_samples > 0
    }

    pub fn sample(&mut self, pressed: bool) -> Option<ButtonEvent> {
        if pressed {
            self.pressed_samples = self.pressed_samples.saturating_add(1);
            if !self.held && self.pressed_samples >= self.hold_samples {
                self.held = true;
                return Some(ButtonEvent::Held);
            }
            return None;
        }

        if self.pressed_samples == 0 {
            return None;
        }
        let event = if self.held {
            ButtonEvent::Released
        } else {
            ButtonEvent::Click
        };
        self.pressed_samples = 0;
        self.held = false;
        Some(event)
    }
}
