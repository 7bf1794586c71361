//! Session and gateway configuration.
//!
//! [`SessionConfig`] holds the runtime knobs of one device session (backend
//! call timeouts, event channel capacity, connect retry). [`GatewayConfig`] is
//! the TOML file a gateway process loads to learn which devices it manages.
//!
//! ```toml
//! [session]
//! read_timeout_ms = 5000
//! connect_retries = 2
//!
//! [[devices]]
//! address = "B0:B4:48:C9:4A:01"
//! name = "CC2650 SensorTag"
//! protocol = "ble"
//! subscribe = ["Temperature", "Pressure"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use devgate_types::{DeviceOverview, ProtocolKind};

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

/// Default timeout for backend reads.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for backend writes.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for backend subscribe and unsubscribe calls.
const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for establishing the backend link.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default capacity of a session's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Longest timeout accepted from a configuration file (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Runtime configuration of a device session.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use devgate_core::SessionConfig;
///
/// let config = SessionConfig::default()
///     .read_timeout(Duration::from_secs(3))
///     .event_capacity(256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Timeout for backend reads.
    pub read_timeout: Duration,
    /// Timeout for backend writes (including enable/disable writes).
    pub write_timeout: Duration,
    /// Timeout for backend subscribe and unsubscribe calls.
    pub subscribe_timeout: Duration,
    /// Timeout for establishing the backend link.
    pub connect_timeout: Duration,
    /// Capacity of the session's event broadcast channel.
    pub event_capacity: usize,
    /// Retry policy for the link step of `connect`.
    pub connect_retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            connect_retry: RetryConfig::none(),
        }
    }
}

impl SessionConfig {
    /// Create a session config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for fast, reliable backends.
    ///
    /// Uses shorter timeouts for quicker failure detection.
    pub fn fast() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(8),
            ..Self::default()
        }
    }

    /// Config for challenging RF environments.
    ///
    /// Uses longer timeouts and retries the backend link.
    pub fn challenging_environment() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            subscribe_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(25),
            connect_retry: RetryConfig::for_connect(),
            ..Self::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the subscribe timeout.
    #[must_use]
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the connect retry policy.
    #[must_use]
    pub fn connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// Fails with [`Error::InvalidConfig`] on a zero timeout or a zero event
    /// capacity.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("subscribe_timeout", self.subscribe_timeout),
            ("connect_timeout", self.connect_timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::invalid_config(format!("{} must be non-zero", name)));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Gateway configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Session settings shared by every device.
    pub session: SessionSettings,
    /// Devices managed by the gateway.
    pub devices: Vec<DeviceEntry>,
}

impl GatewayConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source: e,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: None,
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Timeouts are between 1 ms and [`MAX_TIMEOUT_MS`]
    /// - The event capacity is non-zero
    /// - Device addresses are not empty and not duplicated (case-insensitive)
    /// - Optional device types and subscribed component names are not empty
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut errors = self.session.validate();

        let mut seen_addresses = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{}]", i);
            errors.extend(device.validate(&prefix));

            if !device.address.is_empty()
                && !seen_addresses.insert(device.address.to_lowercase())
            {
                errors.push(ValidationError::new(
                    format!("{}.address", prefix),
                    format!("duplicate device address '{}'", device.address),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Session config derived from the `[session]` table.
    pub fn to_session_config(&self) -> SessionConfig {
        self.session.to_session_config()
    }
}

/// `[session]` table of the gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds.
    pub write_timeout_ms: u64,
    /// Subscribe timeout in milliseconds.
    pub subscribe_timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Event channel capacity.
    pub event_capacity: usize,
    /// Retries for the backend link step of `connect`.
    pub connect_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            read_timeout_ms: defaults.read_timeout.as_millis() as u64,
            write_timeout_ms: defaults.write_timeout.as_millis() as u64,
            subscribe_timeout_ms: defaults.subscribe_timeout.as_millis() as u64,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
            event_capacity: defaults.event_capacity,
            connect_retries: defaults.connect_retry.max_retries,
        }
    }
}

impl SessionSettings {
    /// Validate session settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let timeouts = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("subscribe_timeout_ms", self.subscribe_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                errors.push(ValidationError::new(
                    format!("session.{}", name),
                    "timeout cannot be 0",
                ));
            } else if value > MAX_TIMEOUT_MS {
                errors.push(ValidationError::new(
                    format!("session.{}", name),
                    format!(
                        "timeout {} ms is too long (maximum {} ms)",
                        value, MAX_TIMEOUT_MS
                    ),
                ));
            }
        }

        if self.event_capacity == 0 {
            errors.push(ValidationError::new(
                "session.event_capacity",
                "event capacity must be at least 1",
            ));
        }

        errors
    }

    /// Convert to a [`SessionConfig`].
    pub fn to_session_config(&self) -> SessionConfig {
        let connect_retry = if self.connect_retries == 0 {
            RetryConfig::none()
        } else {
            RetryConfig::for_connect().max_retries(self.connect_retries)
        };
        SessionConfig {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            subscribe_timeout: Duration::from_millis(self.subscribe_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            event_capacity: self.event_capacity,
            connect_retry,
        }
    }
}

/// A device managed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Physical address.
    pub address: String,
    /// Advertised name, used for device type matching.
    #[serde(default)]
    pub name: String,
    /// Protocol the device speaks.
    pub protocol: ProtocolKind,
    /// Device type to use instead of matching on the name.
    #[serde(default)]
    pub device_type: Option<String>,
    /// Components to subscribe to once connected.
    #[serde(default)]
    pub subscribe: Vec<String>,
}

impl DeviceEntry {
    /// Discovery descriptor for this device.
    pub fn overview(&self) -> DeviceOverview {
        DeviceOverview::new(self.address.clone(), self.name.clone(), self.protocol)
    }

    /// Validate the entry.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.address", prefix),
                "device address cannot be empty",
            ));
        }

        if let Some(device_type) = &self.device_type
            && device_type.is_empty()
        {
            errors.push(ValidationError::new(
                format!("{}.device_type", prefix),
                "device type cannot be empty string (omit it to match by name)",
            ));
        }

        for (i, component) in self.subscribe.iter().enumerate() {
            if component.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.subscribe[{}]", prefix, i),
                    "component name cannot be empty",
                ));
            }
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The content is not valid TOML for a gateway configuration.
    #[error("Failed to parse config{}: {source}", format_path(.path))]
    Parse {
        /// Path of the file, if loaded from disk.
        path: Option<PathBuf>,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// One or more fields failed validation.
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `session.read_timeout_ms` or `devices[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" file {}", p.display()))
        .unwrap_or_default()
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
