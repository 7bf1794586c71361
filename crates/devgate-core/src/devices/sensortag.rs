//! TI CC2650 SensorTag.
//!
//! Every SensorTag sensor is powered down until its configuration
//! characteristic is written with `0x01`. Reads therefore prime the sensor
//! (enable, settle, read, disable) and subscriptions enable the sensor and set
//! its period before the raw subscribe.
//!
//! Temperature and humidity come from the same HDC1000 sensor and share one
//! data characteristic; pressure comes from the BMP280 barometer.

use devgate_types::uuids::{
    SENSORTAG_BAROMETER_CONFIG, SENSORTAG_BAROMETER_DATA, SENSORTAG_BAROMETER_PERIOD,
    SENSORTAG_BAROMETER_SERVICE, SENSORTAG_HUMIDITY_CONFIG, SENSORTAG_HUMIDITY_DATA,
    SENSORTAG_HUMIDITY_PERIOD, SENSORTAG_HUMIDITY_SERVICE,
};
use devgate_types::{DecodeError, DecodeResult, DeviceOverview, ProtocolKind, Selector, Value};

use super::DeviceProfile;
use crate::catalog::{ComponentCatalog, ComponentDescriptor, ControlWrite};
use crate::error::Result;
use crate::priming::PrimingPolicy;

/// Device type name.
pub const TYPE_NAME: &str = "SensorTag";

/// Ambient temperature from the humidity sensor.
pub const TEMPERATURE: &str = "Temperature";

/// Relative humidity.
pub const HUMIDITY: &str = "Humidity";

/// Barometric pressure.
pub const PRESSURE: &str = "Pressure";

/// Config payload switching a sensor on.
pub const SENSOR_ON: u8 = 0x01;

/// Config payload switching a sensor off.
pub const SENSOR_OFF: u8 = 0x00;

/// Notification period in units of 10 ms (1 s).
pub const DEFAULT_PERIOD: u8 = 100;

fn characteristic(service: uuid::Uuid, characteristic: uuid::Uuid) -> Selector {
    Selector::gatt(service, characteristic)
}

/// Decode HDC1000 temperature (bytes 0-1, little endian) in °C.
pub fn decode_temperature(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 4)?;
    let raw = u16::from_le_bytes([data[0], data[1]]);
    Ok(Value::Number(f64::from(raw) / 65536.0 * 165.0 - 40.0))
}

/// Decode HDC1000 relative humidity (bytes 2-3, little endian) in %RH.
pub fn decode_humidity(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 4)?;
    let raw = u16::from_le_bytes([data[2], data[3]]) & !0x0003;
    Ok(Value::Number(f64::from(raw) / 65536.0 * 100.0))
}

/// Decode BMP280 pressure (bytes 3-5, 24-bit little endian) in hPa.
pub fn decode_pressure(data: &[u8]) -> DecodeResult<Value> {
    DecodeError::require_len(data, 6)?;
    let raw = u32::from_le_bytes([data[3], data[4], data[5], 0]);
    Ok(Value::Number(f64::from(raw) / 100.0))
}

fn sensor(
    name: &str,
    unit: &str,
    decoder: crate::catalog::Decoder,
    service: uuid::Uuid,
    data: uuid::Uuid,
    config: uuid::Uuid,
    period: uuid::Uuid,
) -> ComponentDescriptor {
    let config = characteristic(service, config);
    ComponentDescriptor::new(name, unit, decoder)
        .data(characteristic(service, data))
        .enable(ControlWrite::new(config.clone(), vec![SENSOR_ON]))
        .disable(ControlWrite::new(config, vec![SENSOR_OFF]))
        .frequency(ControlWrite::new(
            characteristic(service, period),
            vec![DEFAULT_PERIOD],
        ))
}

fn matches(overview: &DeviceOverview) -> bool {
    overview.name.contains("SensorTag")
}

/// Build the SensorTag profile.
pub fn profile() -> Result<DeviceProfile> {
    let catalog = ComponentCatalog::builder()
        .component(sensor(
            TEMPERATURE,
            "Degree celsius (°C)",
            decode_temperature,
            SENSORTAG_HUMIDITY_SERVICE,
            SENSORTAG_HUMIDITY_DATA,
            SENSORTAG_HUMIDITY_CONFIG,
            SENSORTAG_HUMIDITY_PERIOD,
        ))
        .component(sensor(
            HUMIDITY,
            "Relative humidity (%RH)",
            decode_humidity,
            SENSORTAG_HUMIDITY_SERVICE,
            SENSORTAG_HUMIDITY_DATA,
            SENSORTAG_HUMIDITY_CONFIG,
            SENSORTAG_HUMIDITY_PERIOD,
        ))
        .component(sensor(
            PRESSURE,
            "Hectopascal (hPa)",
            decode_pressure,
            SENSORTAG_BAROMETER_SERVICE,
            SENSORTAG_BAROMETER_DATA,
            SENSORTAG_BAROMETER_CONFIG,
            SENSORTAG_BAROMETER_PERIOD,
        ))
        .build()?;

    Ok(DeviceProfile::builder(TYPE_NAME, ProtocolKind::Ble, catalog)
        .priming(PrimingPolicy::enable_then_read())
        .resubscribe_on_connect(true)
        .matcher(matches)
        .build())
}
