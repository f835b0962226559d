//! TOML configuration of a terminal.
//!
//! Every section is optional; missing keys fall back to the defaults in
//! [`constants`](crate::constants).
//!
//! ```
//! use acs_core::config::TerminalConfig;
//!
//! let config = TerminalConfig::from_toml_str(r#"
//!     [device]
//!     serial_number = "a1b2c3d4"
//!
//!     [server]
//!     address = "10.0.0.5:4000"
//!     key = "secret"
//!
//!     [timing]
//!     auth_timeout_ms = 5000
//! "#).unwrap();
//!
//! assert_eq!(config.timing.auth_timeout().as_millis(), 5000);
//! assert_eq!(config.timing.keepalive_interval().as_secs(), 10);
//! ```

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub timing: TimingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl TerminalConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns `Error::Config` if the text is not valid TOML for this schema.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if it
    /// cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the terminal cannot run with.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.device.serial_number.trim().is_empty() {
            return Err(Error::Config("device.serial_number must not be empty".into()));
        }
        self.server.socket_addr()?;
        self.timing.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub serial_number: String,
    pub hardware_version: String,
    pub firmware_version: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_number: String::new(),
            hardware_version: DEFAULT_HARDWARE_VERSION.to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the backend.
    pub address: String,
    /// Device key presented in the handshake.
    pub key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4000".to_string(),
            key: String::new(),
        }
    }
}

impl ServerConfig {
    /// # Errors
    /// Returns `Error::Config` if `address` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| Error::Config(format!("server.address {:?}: {e}", self.address)))
    }
}

/// Timer durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub auth_timeout_ms: u64,
    pub keepalive_interval_ms: u64,
    pub watchdog_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub waiting_timeout_ms: u64,
    pub denied_display_ms: u64,
    pub identify_display_ms: u64,
    pub restart_grace_ms: u64,
    pub transport_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            auth_timeout_ms: AUTH_TIMEOUT_MS,
            keepalive_interval_ms: KEEPALIVE_INTERVAL_MS,
            watchdog_timeout_ms: WATCHDOG_TIMEOUT_MS,
            reconnect_interval_ms: RECONNECT_INTERVAL_MS,
            waiting_timeout_ms: WAITING_TIMEOUT_MS,
            denied_display_ms: DENIED_DISPLAY_MS,
            identify_display_ms: IDENTIFY_DISPLAY_MS,
            restart_grace_ms: RESTART_GRACE_MS,
            transport_timeout_ms: TRANSPORT_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("auth_timeout_ms", self.auth_timeout_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("watchdog_timeout_ms", self.watchdog_timeout_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("waiting_timeout_ms", self.waiting_timeout_ms),
            ("denied_display_ms", self.denied_display_ms),
            ("identify_display_ms", self.identify_display_ms),
            ("transport_timeout_ms", self.transport_timeout_ms),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(Error::Config(format!("timing.{name} must be positive"))),
            None => Ok(()),
        }
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_millis(self.waiting_timeout_ms)
    }

    pub fn denied_display(&self) -> Duration {
        Duration::from_millis(self.denied_display_ms)
    }

    pub fn identify_display(&self) -> Duration {
        Duration::from_millis(self.identify_display_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "acs.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when neither `-v` nor `RUST_LOG` is given.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
