//! Bluetooth UUIDs for the bundled BLE device types.
//!
//! This module contains the GATT services and characteristics needed to talk
//! to the HumiTemp tag and the TI SensorTag through a BLE protocol backend.

use uuid::{Uuid, uuid};

// --- HumiTemp Sensor Tag ---

/// HumiTemp sensor service.
pub const HUMITEMP_SERVICE: Uuid = uuid!("0000aa20-0000-1000-8000-00805f9b34fb");

/// HumiTemp combined temperature/humidity data characteristic.
pub const HUMITEMP_DATA: Uuid = uuid!("0000aa21-0000-1000-8000-00805f9b34fb");

// --- TI SensorTag humidity sensor (HDC1000) ---

/// Humidity service.
pub const SENSORTAG_HUMIDITY_SERVICE: Uuid = uuid!("f000aa20-0451-4000-b000-000000000000");

/// Humidity data characteristic (temperature + relative humidity).
pub const SENSORTAG_HUMIDITY_DATA: Uuid = uuid!("f000aa21-0451-4000-b000-000000000000");

/// Humidity configuration characteristic (enable/disable).
pub const SENSORTAG_HUMIDITY_CONFIG: Uuid = uuid!("f000aa22-0451-4000-b000-000000000000");

/// Humidity period characteristic (notification frequency).
pub const SENSORTAG_HUMIDITY_PERIOD: Uuid = uuid!("f000aa23-0451-4000-b000-000000000000");

// --- TI SensorTag barometric pressure sensor ---

/// Barometer service.
pub const SENSORTAG_BAROMETER_SERVICE: Uuid = uuid!("f000aa40-0451-4000-b000-000000000000");

/// Barometer data characteristic (temperature + pressure).
pub const SENSORTAG_BAROMETER_DATA: Uuid = uuid!("f000aa41-0451-4000-b000-000000000000");

/// Barometer configuration characteristic.
pub const SENSORTAG_BAROMETER_CONFIG: Uuid = uuid!("f000aa42-0451-4000-b000-000000000000");

/// Barometer period characteristic.
pub const SENSORTAG_BAROMETER_PERIOD: Uuid = uuid!("f000aa44-0451-4000-b000-000000000000");
