//! Broadcast name resolution
//! The name in the advertisement data can differ from the one the device
//! reports; programmable peripherals usually only set the former, so it wins.

use crate::core::bluetooth::constants::UNKNOWN_BROADCAST_NAME;
use crate::core::bluetooth::types::Advertisement;

/// Picks the display name for a sighting. Never fails.
pub fn resolve_display_name(advertisement: &Advertisement, device_name: Option<&str>) -> String {
    non_empty(advertisement.local_name.as_deref())
        .or_else(|| non_empty(device_name))
        .unwrap_or(UNKNOWN_BROADCAST_NAME)
        .to_string()
}

fn non_empty(name: Option<&str>) -> Option<&str> {
    name.filter(|name| !name.is_empty())
}
