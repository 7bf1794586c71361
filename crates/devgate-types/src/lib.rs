//! Platform-agnostic types for devgate device sessions.
//!
//! This crate provides the data model shared by the session engine
//! (devgate-core) and any protocol backend implementation.
//!
//! # Features
//!
//! - Device identity, overview and connection state
//! - Decoded values and unit-tagged records
//! - Capability selectors addressing backend sensors
//! - UUID constants for the bundled BLE device types
//! - Error types for payload decoding
//!
//! # Example
//!
//! ```
//! use devgate_types::{DeviceIdentity, DeviceOverview, ProtocolKind, Selector};
//!
//! let overview = DeviceOverview::new("dummy-1", "Dummy Device", ProtocolKind::Dummy);
//! let identity = DeviceIdentity::from_overview(&overview, "Dummy");
//! assert_eq!(identity.id, "dummydummy1");
//! assert!(Selector::new().is_empty());
//! ```

pub mod error;
pub mod selector;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult, UnknownProtocol};
pub use selector::Selector;
pub use types::{
    ConnectionState, DeviceComponent, DeviceIdentity, DeviceOverview, ProtocolKind, RecordObject,
    Value,
};
pub use uuid as uuids;
