//! Bus configuration
//!
//! Settings come from a JSON file, from environment variables, or from
//! [`BusConfig::default`] with fields overridden in code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::bus::DEFAULT_STATUS_CAPACITY;
use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_READING_FIELD, DEFAULT_RESPONSE_TIMEOUT_SECS};
use crate::scale::DEFAULT_EVENT_THRESHOLD;

/// Serial port path
pub const ENV_SERIAL_ADDRESS: &str = "SERIAL_ADDRESS";
/// Baud rate
pub const ENV_SERIAL_BAUDRATE: &str = "SERIAL_BAUDRATE";
/// Weight event database file
pub const ENV_DB_PATH: &str = "SCALELINK_DB_PATH";
/// Reading field override
pub const ENV_READING_FIELD: &str = "SCALELINK_READING_FIELD";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidVar { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to start a bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// How long `send_and_wait` callers wait for a response
    pub response_timeout_secs: u64,
    /// JSON key that carries the weight in readings
    pub reading_field: String,
    /// Minimum weight change that records an event
    pub event_threshold: f64,
    /// Number of status messages kept for pollers
    pub status_buffer_capacity: usize,
    /// SQLite database holding weight events
    pub database_path: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            reading_field: DEFAULT_READING_FIELD.to_string(),
            event_threshold: DEFAULT_EVENT_THRESHOLD,
            status_buffer_capacity: DEFAULT_STATUS_CAPACITY,
            database_path: PathBuf::from("weights.db"),
        }
    }
}

impl BusConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self {
            port_name: lookup(ENV_SERIAL_ADDRESS)
                .ok_or(ConfigError::MissingVar(ENV_SERIAL_ADDRESS))?,
            ..Self::default()
        };

        if let Some(baud) = lookup(ENV_SERIAL_BAUDRATE) {
            config.baud_rate = baud.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: ENV_SERIAL_BAUDRATE,
                value: baud.clone(),
            })?;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(field) = lookup(ENV_READING_FIELD) {
            config.reading_field = field;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bus cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_name.trim().is_empty() {
            return Err(ConfigError::Invalid("port_name is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".into()));
        }
        if self.reading_field.trim().is_empty() {
            return Err(ConfigError::Invalid("reading_field is empty".into()));
        }
        if !(self.event_threshold.is_finite() && self.event_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "event_threshold must be positive, got {}",
                self.event_threshold
            )));
        }
        if self.status_buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "status_buffer_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}
