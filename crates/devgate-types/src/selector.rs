//! Capability selectors.
//!
//! A [`Selector`] is the small key/value profile a protocol backend uses to
//! address one sensor or characteristic of a device. For BLE GATT devices it
//! carries the service and characteristic UUIDs; for the loopback and LoRa
//! transports it is usually empty.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Selector key holding a GATT service UUID.
pub const GATT_SERVICE: &str = "service";

/// Selector key holding a GATT characteristic UUID.
pub const GATT_CHARACTERISTIC: &str = "characteristic";

/// Key/value profile identifying a capability on a device.
///
/// Entries are kept sorted so two selectors with the same entries compare
/// and hash equal regardless of insertion order.
///
/// # Example
///
/// ```
/// use devgate_types::Selector;
///
/// let a = Selector::new().with("service", "aa20").with("characteristic", "aa21");
/// let b = Selector::new().with("characteristic", "aa21").with("service", "aa20");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Selector {
    entries: BTreeMap<String, String>,
}

impl Selector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a GATT selector from a service and characteristic UUID.
    pub fn gatt(service: Uuid, characteristic: Uuid) -> Self {
        Self::new()
            .with(GATT_SERVICE, service.to_string())
            .with(GATT_CHARACTERISTIC, characteristic.to_string())
    }

    /// Add an entry, replacing any previous value for the key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert an entry, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the selector has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every entry of `self` is present with the same value in `other`.
    ///
    /// Keys are compared exactly; values are compared ASCII case-insensitively
    /// because backends report UUIDs in either case. An empty selector matches
    /// every selector.
    pub fn is_subset_of(&self, other: &Selector) -> bool {
        self.entries.iter().all(|(key, value)| {
            other
                .entries
                .get(key)
                .is_some_and(|v| v.eq_ignore_ascii_case(value))
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Selector {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Selector {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}
