//! SQLite persistence of the terminal's device settings.
//!
//! Settings live in a single key/value table. [`SettingsRepository`] gives
//! raw access, [`DeviceSettings`] layers the typed accessors and defaults
//! used by the runtime on top of it.

pub mod connection;
pub mod device;
pub mod error;
pub mod settings;

pub use connection::{Database, DatabaseConfig};
pub use device::DeviceSettings;
pub use error::{StorageError, StorageResult};
pub use settings::{SettingKey, SettingsRepository, SqliteSettingsRepository};
