//! LoRa node device type.
//!
//! LoRa nodes push a single unsigned byte per uplink. The device type is
//! read/subscribe only.

use devgate_types::{DecodeError, DecodeResult, DeviceOverview, ProtocolKind, Value};

use super::DeviceProfile;
use crate::catalog::{ComponentCatalog, ComponentDescriptor};
use crate::error::Result;

/// Device type name.
pub const TYPE_NAME: &str = "LoRa";

/// The single data component.
pub const COMPONENT: &str = "LoraData";

/// Unit of [`COMPONENT`].
pub const UNIT: &str = "lora";

/// Decode the first byte as an unsigned integer.
pub fn decode(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 1)?;
    Ok(Value::Integer(i64::from(data[0])))
}

fn matches(overview: &DeviceOverview) -> bool {
    overview.name.contains("LoRa")
}

/// Build the LoRa profile.
pub fn profile() -> Result<DeviceProfile> {
    let catalog = ComponentCatalog::builder()
        .component(ComponentDescriptor::new(COMPONENT, UNIT, decode))
        .build()?;

    Ok(DeviceProfile::builder(TYPE_NAME, ProtocolKind::Lora, catalog)
        .matcher(matches)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::WriteMode;

    #[test]
    fn test_decode_first_byte_unsigned() {
        assert_eq!(decode(&[0x2a]), Ok(Value::Integer(42)));
        assert_eq!(decode(&[0xff, 0x01]), Ok(Value::Integer(255)));
        assert_eq!(decode(&[]), Err(DecodeError::insufficient(1, 0)));
    }

    #[test]
    fn test_profile_is_read_only() {
        let profile = profile().unwrap();
        assert_eq!(profile.protocol(), ProtocolKind::Lora);
        assert_eq!(profile.write_mode(), &WriteMode::Unsupported);
        assert!(profile.commands().is_empty());
        assert!(profile.matches(&DeviceOverview::new("0004A30B001C", "LoRa mote", ProtocolKind::Lora)));
    }
}
