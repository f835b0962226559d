//! Typed view over the settings table.

use crate::error::{StorageError, StorageResult};
use crate::settings::{SettingKey, SettingsRepository};
use acs_core::constants::DEFAULT_MAX_TEMPERATURE_C;
use acs_core::{AccessState, Tone};
use tracing::debug;

/// Device settings with their defaults applied.
///
/// ```no_run
/// use acs_storage::{Database, DeviceSettings, SqliteSettingsRepository};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let settings = DeviceSettings::new(SqliteSettingsRepository::new(db.pool().clone()));
///
/// let boot = settings.increment_boot_count().await?;
/// let fallback = settings.default_state().await?;
/// println!("boot #{boot}, fallback state {fallback}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeviceSettings<R> {
    repo: R,
}

impl<R: SettingsRepository> DeviceSettings<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub async fn server_address(&self) -> StorageResult<Option<String>> {
        self.repo.get(SettingKey::ServerAddress).await
    }

    pub async fn set_server_address(&self, address: &str) -> StorageResult<()> {
        self.repo.set(SettingKey::ServerAddress, address).await
    }

    pub async fn server_key(&self) -> StorageResult<Option<String>> {
        self.repo.get(SettingKey::ServerKey).await
    }

    pub async fn set_server_key(&self, key: &str) -> StorageResult<()> {
        self.repo.set(SettingKey::ServerKey, key).await
    }

    /// Over-temperature threshold, 40 °C unless stored.
    pub async fn max_temperature(&self) -> StorageResult<f32> {
        match self.repo.get(SettingKey::MaxTemperature).await? {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .map_err(|e| StorageError::invalid("max_temp", e)),
            None => Ok(DEFAULT_MAX_TEMPERATURE_C),
        }
    }

    pub async fn set_max_temperature(&self, celsius: f32) -> StorageResult<()> {
        self.repo
            .set(SettingKey::MaxTemperature, &celsius.to_string())
            .await
    }

    /// Fallback state for a backend that never answers after boot, `Idle`
    /// unless stored.
    pub async fn default_state(&self) -> StorageResult<AccessState> {
        match self.repo.get(SettingKey::DefaultState).await? {
            Some(raw) => raw
                .parse::<AccessState>()
                .map_err(|e| StorageError::invalid("default_state", e)),
            None => Ok(AccessState::Idle),
        }
    }

    pub async fn set_default_state(&self, state: AccessState) -> StorageResult<()> {
        self.repo.set(SettingKey::DefaultState, state.as_str()).await
    }

    pub async fn custom_tone(&self) -> StorageResult<Option<Tone>> {
        match self.repo.get(SettingKey::CustomTone).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::invalid("custom_tone", e)),
            None => Ok(None),
        }
    }

    pub async fn set_custom_tone(&self, tone: &Tone) -> StorageResult<()> {
        let raw = serde_json::to_string(tone).map_err(|e| StorageError::invalid("custom_tone", e))?;
        self.repo.set(SettingKey::CustomTone, &raw).await?;
        debug!(notes = tone.notes.len(), "custom tone stored");
        Ok(())
    }

    pub async fn boot_count(&self) -> StorageResult<u32> {
        match self.repo.get(SettingKey::BootCount).await? {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| StorageError::invalid("boot_count", e)),
            None => Ok(0),
        }
    }

    /// Count this boot and return the new total.
    pub async fn increment_boot_count(&self) -> StorageResult<u32> {
        let count = self.boot_count().await?.saturating_add(1);
        self.repo
            .set(SettingKey::BootCount, &count.to_string())
            .await?;
        Ok(count)
    }
}
