//! Loopback "Dummy" device type.
//!
//! Used to exercise the gateway end to end without radio hardware. Payloads
//! are UTF-8 text, writes pass straight through to the backend, and two macro
//! commands write single marker bytes.

use devgate_types::{DecodeError, DecodeResult, DeviceOverview, ProtocolKind, Selector, Value};

use super::{CommandAction, DeviceProfile, WriteMode};
use crate::catalog::{ComponentCatalog, ComponentDescriptor};
use crate::error::Result;

/// Device type name.
pub const TYPE_NAME: &str = "Dummy";

/// The single data component.
pub const COMPONENT: &str = "DummyData";

/// Unit of [`COMPONENT`].
pub const UNIT: &str = "dum";

/// Selector that writes and commands are addressed to.
pub fn write_selector() -> Selector {
    Selector::from([(COMPONENT, UNIT)])
}

/// Decode a payload as UTF-8 text.
pub fn decode(data: &[u8]) -> DecodeResult<Value> {
    std::str::from_utf8(data)
        .map(Value::from)
        .map_err(|e| DecodeError::InvalidValue(format!("payload is not UTF-8: {}", e)))
}

fn matches(overview: &DeviceOverview) -> bool {
    overview.name.contains("Dummy")
}

/// Build the Dummy profile.
pub fn profile() -> Result<DeviceProfile> {
    let catalog = ComponentCatalog::builder()
        .component(ComponentDescriptor::new(COMPONENT, UNIT, decode))
        .build()?;

    Ok(DeviceProfile::builder(TYPE_NAME, ProtocolKind::Dummy, catalog)
        .write_mode(WriteMode::Passthrough {
            selector: write_selector(),
        })
        .command("Dummy Command 1", CommandAction::Write(vec![0x01].into()))
        .command("Dummy Command 2", CommandAction::Write(vec![0x02].into()))
        .command_selector(write_selector())
        .matcher(matches)
        .build())
}
