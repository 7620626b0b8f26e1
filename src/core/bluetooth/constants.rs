//! Constants used throughout the session core
//! Broadcast name sentinel, scan defaults and the GATT characteristic
//! property bits the capability flags are derived from.

use uuid::Uuid;

/// Display name used when neither the advertisement nor the device carry one
pub const UNKNOWN_BROADCAST_NAME: &str = "(UNMARKED)";

/// RSSI recorded when the platform reports none, below any real reading
pub const UNKNOWN_RSSI: i16 = i16::MIN;

/// Scan window in seconds (one tick per second)
pub const DEFAULT_SCAN_TIMEOUT_SECS: u32 = 5;

/// Interval between cooperative scan ticks in milliseconds
pub const SCAN_TICK_INTERVAL_MS: u64 = 1000;

/// Timeout for a single connection attempt in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Capacity of every observer broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// GATT characteristic property bits (Bluetooth Core Spec Vol 3, Part G, 3.3.1.1)
pub const PROPERTY_BROADCAST: u32 = 0x01;
pub const PROPERTY_READ: u32 = 0x02;
pub const PROPERTY_WRITE_WITHOUT_RESPONSE: u32 = 0x04;
pub const PROPERTY_WRITE: u32 = 0x08;
pub const PROPERTY_NOTIFY: u32 = 0x10;
pub const PROPERTY_INDICATE: u32 = 0x20;
pub const PROPERTY_AUTHENTICATED_SIGNED_WRITES: u32 = 0x40;
pub const PROPERTY_EXTENDED_PROPERTIES: u32 = 0x80;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Human readable name for the handful of services every peripheral exposes
pub fn well_known_service_name(uuid: &Uuid) -> Option<&'static str> {
    const NAMES: [(Uuid, &str); 4] = [
        (UUID_GENERIC_ACCESS_SERVICE, "Generic Access"),
        (UUID_GENERIC_ATTRIBUTE_SERVICE, "Generic Attribute"),
        (UUID_DEVICE_INFORMATION_SERVICE, "Device Information"),
        (UUID_BATTERY_SERVICE, "Battery"),
    ];
    NAMES
        .iter()
        .find(|(known, _)| known == uuid)
        .map(|(_, name)| *name)
}
