//! Recording output devices.
//!
//! Every call on a mock output is forwarded, in order, to one
//! [`MockOutputs`] receiver so tests and the emulator can observe what the
//! terminal did.

use crate::error::Result;
use crate::traits::{Actuator, FirmwareUpdater, Indicator, Sounder, SystemControl};
use crate::types::{IndicatorPattern, SoundEffect};
use acs_core::Tone;
use std::time::Duration;
use tokio::sync::mpsc;

/// Something the terminal asked an output device to do.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Actuator(bool),
    Indicator(IndicatorPattern),
    Effect(SoundEffect),
    Tone(Tone),
    FirmwareUpdate(String),
    Reboot,
}

type Tx = mpsc::UnboundedSender<OutputEvent>;

fn record(tx: &Tx, event: OutputEvent) -> Result<()> {
    // Nobody watching is fine for a mock.
    let _ = tx.send(event);
    Ok(())
}

pub(crate) fn outputs() -> (Tx, MockOutputs) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, MockOutputs { rx })
}

#[derive(Debug, Clone)]
pub struct MockActuator {
    pub(crate) tx: Tx,
}

impl Actuator for MockActuator {
    async fn set_engaged(&self, engaged: bool) -> Result<()> {
        record(&self.tx, OutputEvent::Actuator(engaged))
    }
}

#[derive(Debug, Clone)]
pub struct MockIndicator {
    pub(crate) tx: Tx,
}

impl Indicator for MockIndicator {
    async fn show(&self, pattern: IndicatorPattern) -> Result<()> {
        record(&self.tx, OutputEvent::Indicator(pattern))
    }
}

#[derive(Debug, Clone)]
pub struct MockSounder {
    pub(crate) tx: Tx,
}

impl Sounder for MockSounder {
    async fn play_effect(&self, effect: SoundEffect) -> Result<()> {
        record(&self.tx, OutputEvent::Effect(effect))
    }

    async fn play_tone(&self, tone: &Tone) -> Result<()> {
        record(&self.tx, OutputEvent::Tone(tone.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct MockUpdater {
    pub(crate) tx: Tx,
}

impl FirmwareUpdater for MockUpdater {
    async fn begin(&self, tag: &str) -> Result<()> {
        record(&self.tx, OutputEvent::FirmwareUpdate(tag.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct MockSystem {
    pub(crate) tx: Tx,
}

impl SystemControl for MockSystem {
    async fn reboot(&self) -> Result<()> {
        record(&self.tx, OutputEvent::Reboot)
    }
}

/// Receiving end of every mock output device.
#[derive(Debug)]
pub struct MockOutputs {
    rx: mpsc::UnboundedReceiver<OutputEvent>,
}

impl MockOutputs {
    pub async fn next(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<OutputEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything recorded so far.
    pub fn drain(&mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Skip events until one matches, giving up after `within`.
    pub async fn wait_for(
        &mut self,
        within: Duration,
        mut matches: impl FnMut(&OutputEvent) -> bool,
    ) -> Option<OutputEvent> {
        tokio::time::timeout(within, async {
            while let Some(event) = self.rx.recv().await {
                if matches(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}
