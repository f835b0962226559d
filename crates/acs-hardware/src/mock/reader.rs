//! Simulated credential slot: the RF reader and its two tamper switches.

use crate::error::{HardwareError, Result};
use crate::traits::{CredentialReader, TamperSwitches};
use crate::types::SwitchReading;
use acs_core::CredentialId;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CardSlot {
    card: Option<CredentialId>,
    switches: SwitchReading,
    read_error: bool,
}

/// Create a connected reader, switch pair and the handle that drives them.
pub fn card_slot() -> (MockReader, MockSwitches, MockCardHandle) {
    let (tx, rx) = watch::channel(CardSlot::default());
    (
        MockReader { slot: rx.clone() },
        MockSwitches { slot: rx },
        MockCardHandle { slot: Arc::new(tx) },
    )
}

#[derive(Debug)]
pub struct MockReader {
    slot: watch::Receiver<CardSlot>,
}

impl CredentialReader for MockReader {
    async fn poll(&mut self) -> Result<Option<CredentialId>> {
        let slot = *self.slot.borrow();
        if slot.read_error {
            return Err(HardwareError::card_read("simulated read failure"));
        }
        Ok(slot.card)
    }
}

#[derive(Debug)]
pub struct MockSwitches {
    slot: watch::Receiver<CardSlot>,
}

impl TamperSwitches for MockSwitches {
    async fn read(&mut self) -> Result<SwitchReading> {
        Ok(self.slot.borrow().switches)
    }
}

/// Test-side control of the simulated slot.
///
/// ```
/// use acs_hardware::mock::card_slot;
/// use acs_hardware::traits::CredentialReader;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> acs_hardware::Result<()> {
/// let (mut reader, _switches, handle) = card_slot();
/// handle.present("04a1b2c3".parse().unwrap());
/// assert!(reader.poll().await?.is_some());
///
/// handle.remove();
/// assert!(reader.poll().await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockCardHandle {
    slot: Arc<watch::Sender<CardSlot>>,
}

impl MockCardHandle {
    /// Insert a credential; both switches close.
    pub fn present(&self, card: CredentialId) {
        self.slot.send_modify(|slot| {
            slot.card = Some(card);
            slot.switches = SwitchReading::CLOSED;
            slot.read_error = false;
        });
    }

    /// Take the credential out; both switches open.
    pub fn remove(&self) {
        self.slot.send_modify(|slot| {
            slot.card = None;
            slot.switches = SwitchReading::OPEN;
            slot.read_error = false;
        });
    }

    /// Override the switch levels without touching the credential.
    pub fn set_switches(&self, first: bool, second: bool) {
        self.slot
            .send_modify(|slot| slot.switches = SwitchReading::new(first, second));
    }

    /// Make every poll fail with a card read error until cleared.
    pub fn set_read_error(&self, failing: bool) {
        self.slot.send_modify(|slot| slot.read_error = failing);
    }

    pub fn current(&self) -> Option<CredentialId> {
        self.slot.borrow().card
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CredentialId {
        "04a1b2c3d4e5f6".parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_slot() {
        let (mut reader, mut switches, _handle) = card_slot();
        assert_eq!(reader.poll().await.unwrap(), None);
        assert_eq!(switches.read().await.unwrap(), SwitchReading::OPEN);
    }

    #[tokio::test]
    async fn test_present_and_remove() {
        let (mut reader, mut switches, handle) = card_slot();

        handle.present(card());
        assert_eq!(reader.poll().await.unwrap(), Some(card()));
        assert_eq!(switches.read().await.unwrap(), SwitchReading::CLOSED);
        assert_eq!(handle.current(), Some(card()));

        handle.remove();
        assert_eq!(reader.poll().await.unwrap(), None);
        assert_eq!(switches.read().await.unwrap(), SwitchReading::OPEN);
    }

    #[tokio::test]
    async fn test_read_error() {
        let (mut reader, _switches, handle) = card_slot();
        handle.present(card());
        handle.set_read_error(true);

        let error = reader.poll().await.unwrap_err();
        assert!(error.is_card_read());

        handle.set_read_error(false);
        assert_eq!(reader.poll().await.unwrap(), Some(card()));
    }

    #[tokio::test]
    async fn test_switch_override() {
        let (_reader, mut switches, handle) = card_slot();
        handle.set_switches(true, false);
        assert_eq!(
            switches.read().await.unwrap(),
            SwitchReading::new(true, false)
        );
    }
}
