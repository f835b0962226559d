#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use sqlx::SqlitePool;
use std::fmt;

/// Keys of the persisted device settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// `host:port` of the backend, overrides the config file.
    ServerAddress,
    /// Device key for the handshake, overrides the config file.
    ServerKey,
    /// Over-temperature fault threshold in degrees Celsius.
    MaxTemperature,
    /// State commanded when the backend never answers after boot.
    DefaultState,
    /// Custom tone as uploaded by the backend (JSON).
    CustomTone,
    BootCount,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::ServerAddress,
        SettingKey::ServerKey,
        SettingKey::MaxTemperature,
        SettingKey::DefaultState,
        SettingKey::CustomTone,
        SettingKey::BootCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::ServerAddress => "server_address",
            SettingKey::ServerKey => "server_key",
            SettingKey::MaxTemperature => "max_temp",
            SettingKey::DefaultState => "default_state",
            SettingKey::CustomTone => "custom_tone",
            SettingKey::BootCount => "boot_count",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw key/value access to the settings table.
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: SettingKey) -> StorageResult<Option<String>>;

    /// Insert or replace the value.
    async fn set(&self, key: SettingKey, value: &str) -> StorageResult<()>;

    /// Delete the value. Removing an absent key is not an error.
    async fn remove(&self, key: SettingKey) -> StorageResult<()>;
}

/// SQLite implementation of SettingsRepository
#[derive(Debug, Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SettingsRepository for SqliteSettingsRepository {
    async fn get(&self, key: SettingKey) -> StorageResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: SettingKey, value: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: SettingKey) -> StorageResult<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_distinct() {
        let names: HashSet<_> = SettingKey::ALL.iter().map(SettingKey::as_str).collect();
        assert_eq!(names.len(), SettingKey::ALL.len());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SettingKey::MaxTemperature.to_string(), "max_temp");
    }
}
