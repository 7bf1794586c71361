//! HumiTemp BLE sensor tag.
//!
//! Temperature and humidity arrive together in one notification on a single
//! characteristic, so both components share one selector and every
//! notification yields two records. The tag reports zeros while warming up;
//! those are filtered.
//!
//! Payload layout:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | 0 | temperature sign (even = positive, odd = negative) |
//! | 1 | temperature integer part |
//! | 2 | temperature tenths |
//! | 3 | reserved |
//! | 4 | humidity integer part |
//! | 5 | humidity tenths |

use devgate_types::uuids::{HUMITEMP_DATA, HUMITEMP_SERVICE};
use devgate_types::{DecodeError, DecodeResult, DeviceOverview, ProtocolKind, Selector, Value};

use super::DeviceProfile;
use crate::catalog::{ComponentCatalog, ComponentDescriptor};
use crate::error::Result;

/// Device type name.
pub const TYPE_NAME: &str = "HumiTemp";

/// Temperature component.
pub const TEMPERATURE: &str = "Temperature";

/// Humidity component.
pub const HUMIDITY: &str = "Humidity";

/// Unit of [`TEMPERATURE`].
pub const TEMPERATURE_UNIT: &str = "Degree celsius (°C)";

/// Unit of [`HUMIDITY`].
pub const HUMIDITY_UNIT: &str = "Relative humidity (%RH)";

/// Selector shared by both components.
pub fn data_selector() -> Selector {
    Selector::gatt(HUMITEMP_SERVICE, HUMITEMP_DATA)
}

/// Decode temperature: sign from byte 0, integer and tenths from bytes 1 and 2.
pub fn decode_temperature(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 3)?;
    let magnitude = f64::from(data[1]) + f64::from(data[2]) / 10.0;
    let sign = if data[0] % 2 == 0 { 1.0 } else { -1.0 };
    Ok(Value::Number(sign * magnitude))
}

/// Decode humidity: integer and tenths from bytes 4 and 5.
pub fn decode_humidity(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 6)?;
    Ok(Value::Number(f64::from(data[4]) + f64::from(data[5]) / 10.0))
}

fn matches(overview: &DeviceOverview) -> bool {
    overview.name.contains("HumiTemp Sensor Tag")
}

/// Build the HumiTemp profile.
pub fn profile() -> Result<DeviceProfile> {
    let catalog = ComponentCatalog::builder()
        .component(
            ComponentDescriptor::new(TEMPERATURE, TEMPERATURE_UNIT, decode_temperature)
                .data(data_selector()),
        )
        .component(
            ComponentDescriptor::new(HUMIDITY, HUMIDITY_UNIT, decode_humidity)
                .data(data_selector()),
        )
        .build()?;

    Ok(DeviceProfile::builder(TYPE_NAME, ProtocolKind::Ble, catalog)
        .filter_zero_readings(true)
        .resubscribe_on_connect(true)
        .matcher(matches)
        .build())
}
