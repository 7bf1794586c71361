//! Device-session engine for the devgate IoT gateway.
//!
//! This crate turns a remote protocol backend (BLE GATT, LoRa, loopback) into
//! per-device sessions with a uniform control surface: connect, disconnect,
//! status, read, write, subscribe, unsubscribe, execute and commands.
//!
//! # Features
//!
//! - **Device types as data**: component catalogs, priming policies and
//!   command tables bundled in a [`DeviceProfile`]
//! - **Reference-counted subscriptions**: one backend subscription per
//!   selector, however many logical subscribers
//! - **Notification routing**: one listener per session demultiplexes raw
//!   notifications into decoded records
//! - **Sensor priming**: enable, settle, read, disable for power-controlled
//!   sensors
//! - **Events and streams**: connection changes and records over a tokio
//!   broadcast channel, or as a [`RecordStream`]
//! - **Gateway configuration**: TOML device lists with aggregated validation
//!
//! # Bundled Device Types
//!
//! | Device type | Protocol | Components |
//! |-------------|----------|------------|
//! | Dummy | dummy | DummyData |
//! | LoRa | lora | LoraData |
//! | HumiTemp | ble | Temperature, Humidity |
//! | SensorTag | ble | Temperature, Humidity, Pressure |
//! | Switch | dummy | power control only |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use devgate_core::mock::MockBackend;
//! use devgate_core::{DeviceOverview, DeviceRegistry, ProtocolKind, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), devgate_core::Error> {
//!     let registry = DeviceRegistry::with_defaults()?;
//!     let backend = Arc::new(MockBackend::new(ProtocolKind::Lora));
//!     backend.set_default_read(vec![17u8]).await;
//!
//!     let overview = DeviceOverview::new("0004A30B", "LoRa node", ProtocolKind::Lora);
//!     let session = registry.create_session(&overview, backend, SessionConfig::default())?;
//!
//!     session.connect().await?;
//!     let record = session.read("LoraData").await?;
//!     println!("{} = {} {}", record.component, record.value, record.unit);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod ledger;
pub mod mock;
pub mod priming;
pub mod registry;
pub mod retry;
pub mod router;
pub mod session;
pub mod streaming;

// Core exports
pub use backend::{BackendResult, Notification, ProtocolBackend, SharedBackend};
pub use catalog::{ComponentCatalog, ComponentDescriptor, ControlWrite};
pub use config::{ConfigError, DeviceEntry, GatewayConfig, SessionConfig, SessionSettings};
pub use devices::{Command, CommandAction, DeviceProfile, WriteMode};
pub use error::{BackendError, Error, Result};
pub use events::{DeviceEvent, EventDispatcher, EventReceiver, EventSender};
pub use ledger::SubscriptionLedger;
pub use priming::PrimingPolicy;
pub use registry::{ConfiguredSession, DeviceRegistry};
pub use retry::{RetryConfig, with_retry};
pub use router::{NotificationRouter, Routed, route};
pub use session::DeviceSession;
pub use streaming::{RecordStream, StreamOptions, StreamOptionsBuilder};

/// Type alias for a shared session reference.
///
/// Sessions are not `Clone`; wrap one in `Arc` to call it from several tasks.
pub type SharedSession = std::sync::Arc<DeviceSession>;

// Re-export from devgate-types
pub use devgate_types::uuids;
pub use devgate_types::{
    ConnectionState, DecodeError, DeviceComponent, DeviceIdentity, DeviceOverview, ProtocolKind,
    RecordObject, Selector, Value,
};
