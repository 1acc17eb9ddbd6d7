//! Configuration system using Figment
//!
//! Configuration is loaded from:
//! 1. `rfid_reader.toml` (or an explicit path)
//! 2. Environment variables prefixed with `RFID_READER_`
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! RFID_READER_READER__ADDRESS=10.0.0.5
//! RFID_READER_READER__CONNECT_TIMEOUT_MS=5000
//! RFID_READER_APPLICATION__LOG_LEVEL=debug
//! ```
//!
//! # Example
//!
//! ```toml
//! [application]
//! name = "dock door 3"
//! log_level = "info"
//!
//! [reader]
//! address = "10.0.0.5"
//! port = 8160
//! connect_timeout_ms = 3000
//! heartbeat = true
//!
//! [inventory]
//! antenna_mask = 1
//! mode = "continuous"
//! read_tid = true
//! read_user_data = false
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::inventory::request::ReadOptions;
use crate::logging;
use crate::transport::Endpoint;
use crate::types::{AntennaMask, ReadMode};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rfid_reader.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RFID_READER_";

/// TCP port the reader listens on out of the box.
pub const DEFAULT_READER_PORT: u16 = 8160;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Application name, log level and log format
    pub application: ApplicationConfig,
    /// Reader endpoint and link options
    pub reader: ConnectionConfig,
    /// Inventory defaults
    pub inventory: InventoryDefaults,
    /// Event delivery
    pub events: EventConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Name shown in the startup log line
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of human readable ones
    pub json_logs: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rfid-reader".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Reader link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Reader IP address or host name
    pub address: String,
    /// Reader TCP port
    pub port: u16,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Enable heartbeat-based disconnect detection after connecting
    pub heartbeat: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "192.168.1.168".to_string(),
            port: DEFAULT_READER_PORT,
            connect_timeout_ms: 3000,
            heartbeat: true,
        }
    }
}

impl ConnectionConfig {
    /// Configured reader endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Defaults for inventories started without explicit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryDefaults {
    /// Antennas to scan, bit 0 = antenna 1
    pub antenna_mask: u32,
    /// Single or continuous reading
    pub mode: ReadMode,
    /// Read TID alongside the EPC
    pub read_tid: bool,
    /// Read user memory alongside the EPC
    pub read_user_data: bool,
}

impl Default for InventoryDefaults {
    fn default() -> Self {
        Self {
            antenna_mask: 1,
            mode: ReadMode::Continuous,
            read_tid: false,
            read_user_data: false,
        }
    }
}

impl InventoryDefaults {
    /// The configured antenna set.
    pub fn antennas(&self) -> AntennaMask {
        AntennaMask::from_bits(self.antenna_mask)
    }

    /// The configured optional reads.
    pub fn options(&self) -> ReadOptions {
        ReadOptions::new(self.read_tid, self.read_user_data)
    }
}

/// Event delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Capacity of the per-link event channel used by transports
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl ReaderConfig {
    /// Loads `rfid_reader.toml` from the working directory plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads from a specific file plus environment overrides. A missing file
    /// leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(ReaderConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the configuration to `path`, e.g. to seed a starter file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Checks values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reader.address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "reader.address must not be empty".to_string(),
            ));
        }
        if self.reader.port == 0 {
            return Err(ConfigError::Validation(
                "reader.port must be non-zero".to_string(),
            ));
        }
        if self.reader.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "reader.connect_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.inventory.antenna_mask == 0 {
            return Err(ConfigError::Validation(
                "inventory.antenna_mask must select at least one antenna".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "events.channel_capacity must be non-zero".to_string(),
            ));
        }
        logging::parse_level(&self.application.log_level).map_err(|_| {
            ConfigError::Validation(format!(
                "application.log_level '{}' is not one of trace, debug, info, warn, error",
                self.application.log_level
            ))
        })?;
        Ok(())
    }
}
