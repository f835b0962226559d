//! Over-temperature detection.

use acs_core::FaultReason;
use tracing::warn;

/// Decides when a temperature reading must fault the terminal.
///
/// Readings at or above the maximum, or at or below 0 °C, are out of range.
/// One fault is raised per excursion; a reading back in range re-arms it.
#[derive(Debug, Clone)]
pub struct TemperatureGuard {
    max_celsius: f32,
    in_excursion: bool,
}

impl TemperatureGuard {
    pub fn new(max_celsius: f32) -> Self {
        Self {
            max_celsius,
            in_excursion: false,
        }
    }

    pub fn observe(&mut self, celsius: f32) -> Option<FaultReason> {
        let out_of_range = celsius >= self.max_celsius || celsius <= 0.0;
        if !out_of_range {
            self.in_excursion = false;
            return None;
        }
        if self.in_excursion {
            return None;
        }
        self.in_excursion = true;
        warn!(celsius, max = self.max_celsius, "temperature out of range");
        Some(FaultReason::OverTemperature)
    }
}
