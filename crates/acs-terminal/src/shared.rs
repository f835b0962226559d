//! Status shared between the terminal's tasks.
//!
//! Every access takes the lock with a [`LOCK_TIMEOUT_MS`] deadline. A timeout
//! is an [`Error::LockTimeout`], a soft error callers log before skipping the
//! cycle.

use std::time::Duration;

use acs_core::constants::LOCK_TIMEOUT_MS;
use acs_core::{AccessState, CredentialId, Error, Result};
use tokio::sync::{Mutex, MutexGuard};

/// Copy of every shared field, taken under one lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub state: AccessState,
    pub credential: Option<CredentialId>,
    pub online: bool,
    pub temperature: f32,
    pub button_held: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: AccessState::Startup,
            credential: None,
            online: false,
            temperature: 0.0,
            button_held: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SharedStatus {
    inner: Mutex<StatusSnapshot>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock(&self) -> Result<MutexGuard<'_, StatusSnapshot>> {
        tokio::time::timeout(Duration::from_millis(LOCK_TIMEOUT_MS), self.inner.lock())
            .await
            .map_err(|_| Error::LockTimeout(LOCK_TIMEOUT_MS))
    }

    pub async fn snapshot(&self) -> Result<StatusSnapshot> {
        Ok(*self.lock().await?)
    }

    pub async fn state(&self) -> Result<AccessState> {
        Ok(self.lock().await?.state)
    }

    pub async fn set_state(&self, state: AccessState) -> Result<()> {
        self.lock().await?.state = state;
        Ok(())
    }

    /// Fill or clear the credential slot.
    pub async fn set_credential(&self, credential: Option<CredentialId>) -> Result<()> {
        self.lock().await?.credential = credential;
        Ok(())
    }

    pub async fn online(&self) -> Result<bool> {
        Ok(self.lock().await?.online)
    }

    pub async fn set_online(&self, online: bool) -> Result<()> {
        self.lock().await?.online = online;
        Ok(())
    }

    pub async fn set_temperature(&self, celsius: f32) -> Result<()> {
        self.lock().await?.temperature = celsius;
        Ok(())
    }

    /// Whether the button is down right now.
    pub async fn button_held(&self) -> Result<bool> {
        Ok(self.lock().await?.button_held)
    }

    pub async fn set_button_held(&self, held: bool) -> Result<()> {
        self.lock().await?.button_held = held;
        Ok(())
    }
}
