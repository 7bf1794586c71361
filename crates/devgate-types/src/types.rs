//! Core types for device sessions.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::UnknownProtocol;

/// Transport a device is reached through.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new transports
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum ProtocolKind {
    /// Bluetooth Low Energy (GATT).
    Ble,
    /// LoRa radio.
    Lora,
    /// Loopback transport used for testing and demos.
    Dummy,
}

impl ProtocolKind {
    /// Short lowercase protocol name.
    ///
    /// # Examples
    ///
    /// ```
    /// use devgate_types::ProtocolKind;
    ///
    /// assert_eq!(ProtocolKind::Ble.as_str(), "ble");
    /// assert_eq!(ProtocolKind::Lora.as_str(), "lora");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Ble => "ble",
            ProtocolKind::Lora => "lora",
            ProtocolKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = UnknownProtocol;

    /// Parse a protocol name (case-insensitive).
    ///
    /// Accepts the short names plus the common long spelling of BLE.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ble" | "bluetooth" | "bluetoothlowenergy" | "bluetooth-le" => Ok(ProtocolKind::Ble),
            "lora" => Ok(ProtocolKind::Lora),
            "dummy" => Ok(ProtocolKind::Dummy),
            _ => Err(UnknownProtocol(s.to_string())),
        }
    }
}

/// Connection state of a device session.
///
/// `On` and `Off` are used by power-controllable device types. Only
/// `Connected` and `On` allow sensor operations; `Off` keeps the session
/// attached so it can be switched back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected (initial state).
    #[default]
    Disconnected = 0,
    /// Connected and ready for sensor operations.
    Connected = 1,
    /// Powered on (connected-equivalent).
    On = 2,
    /// Powered off.
    Off = 3,
}

impl ConnectionState {
    /// Whether sensor operations (read, subscribe, write) are allowed.
    ///
    /// ```
    /// use devgate_types::ConnectionState;
    ///
    /// assert!(ConnectionState::Connected.is_connected());
    /// assert!(ConnectionState::On.is_connected());
    /// assert!(!ConnectionState::Off.is_connected());
    /// assert!(!ConnectionState::Disconnected.is_connected());
    /// ```
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::On)
    }

    /// Whether the session holds a link at all (anything but `Disconnected`).
    #[must_use]
    pub fn is_linked(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connected,
            2 => ConnectionState::On,
            3 => ConnectionState::Off,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
            ConnectionState::On => write!(f, "ON"),
            ConnectionState::Off => write!(f, "OFF"),
        }
    }
}

/// Discovery metadata for a physical device, as reported by a protocol backend.
///
/// Device types use it to decide whether they handle a device; sessions use
/// it to derive their [`DeviceIdentity`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceOverview {
    /// Physical address (MAC address, DevEUI or loopback id).
    pub address: String,
    /// Advertised device name.
    pub name: String,
    /// Transport the device was discovered on.
    pub protocol: ProtocolKind,
}

impl DeviceOverview {
    /// Create a new device overview.
    pub fn new(address: impl Into<String>, name: impl Into<String>, protocol: ProtocolKind) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            protocol,
        }
    }
}

/// Immutable identity of a device session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Logical device id, unique within the gateway.
    pub id: String,
    /// Physical address used when calling the protocol backend.
    pub address: String,
    /// Declared transport.
    pub protocol: ProtocolKind,
    /// Device type name (e.g. `"Dummy"`).
    pub device_type: String,
    /// Human-readable name from discovery.
    pub name: String,
}

impl DeviceIdentity {
    /// Derive an identity from discovery metadata.
    ///
    /// The logical id is the protocol name followed by the address with
    /// separators removed, so it is safe to use as a bus object name.
    ///
    /// ```
    /// use devgate_types::{DeviceIdentity, DeviceOverview, ProtocolKind};
    ///
    /// let overview = DeviceOverview::new("78:C5:E5:6E:E4:CF", "SensorTag", ProtocolKind::Ble);
    /// let identity = DeviceIdentity::from_overview(&overview, "SensorTag");
    /// assert_eq!(identity.id, "ble78C5E56EE4CF");
    /// ```
    pub fn from_overview(overview: &DeviceOverview, device_type: impl Into<String>) -> Self {
        let compact: String = overview
            .address
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        Self {
            id: format!("{}{}", overview.protocol.as_str(), compact),
            address: overview.address.clone(),
            protocol: overview.protocol,
            device_type: device_type.into(),
            name: overview.name.clone(),
        }
    }
}

/// A logical component exposed by a device, with its unit of measure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceComponent {
    /// Component name (e.g. `"Temperature"`).
    pub name: String,
    /// Unit of measure, possibly empty.
    pub unit: String,
}

/// A decoded component value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Whole number.
    Integer(i64),
    /// Floating point measurement.
    Number(f64),
    /// Free text.
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    ///
    /// Text values are parsed, so a loopback device echoing `"21.5"` still
    /// yields a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Whether the value is numerically exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.as_f64() == Some(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// A unit-tagged reading of one component, produced by a read or a notification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordObject {
    /// Logical id of the device that produced the record.
    pub device_id: String,
    /// Component the value belongs to.
    pub component: String,
    /// Decoded value.
    pub value: Value,
    /// Unit of measure, possibly empty.
    pub unit: String,
    /// When the record was produced.
    pub timestamp: OffsetDateTime,
}

impl RecordObject {
    /// Create a record stamped with the current time.
    pub fn new(
        device_id: impl Into<String>,
        component: impl Into<String>,
        value: Value,
        unit: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(device_id, component, value, unit, OffsetDateTime::now_utc())
    }

    /// Create a record with an explicit timestamp.
    pub fn with_timestamp(
        device_id: impl Into<String>,
        component: impl Into<String>,
        value: Value,
        unit: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            component: component.into(),
            value,
            unit: unit.into(),
            timestamp,
        }
    }
}
