//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    PROPERTY_INDICATE, PROPERTY_NOTIFY, PROPERTY_READ, PROPERTY_WRITE,
    PROPERTY_WRITE_WITHOUT_RESPONSE,
};

/// Platform-specific unique identifier of a peripheral, stable per physical device
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Link state of a discovered peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

/// Represents a discovered Bluetooth peripheral
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeripheralRecord {
    /// Identifier reported by the radio
    pub id: PeripheralId,
    /// The resolved broadcast name, or the unknown-name sentinel
    pub display_name: String,
    /// The signal strength (RSSI) at first sighting, or at the last explicit read
    pub rssi: i16,
    /// Whether the peripheral advertised itself as connectable
    pub connectable: bool,
    /// Current link state
    pub link_state: LinkState,
}

impl PeripheralRecord {
    /// Creates a new record in the `Discovered` state
    pub fn new(id: PeripheralId, display_name: String, rssi: i16, connectable: bool) -> Self {
        Self {
            id,
            display_name,
            rssi,
            connectable,
            link_state: LinkState::Discovered,
        }
    }
}

/// Advertisement fields the session core cares about.
///
/// Byte-level parsing is the radio layer's job; adapters fill this in from
/// whatever their platform stack already decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Local name carried in the advertisement data itself
    pub local_name: Option<String>,
    /// Whether the advertising PDU was connectable
    pub is_connectable: bool,
}

/// Capability flags derived from the characteristic property bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacteristicFlags {
    pub readable: bool,
    pub writable: bool,
    pub notifiable: bool,
}

impl CharacteristicFlags {
    pub fn from_properties(properties: u32) -> Self {
        Self {
            readable: properties & PROPERTY_READ != 0,
            writable: properties & (PROPERTY_WRITE | PROPERTY_WRITE_WITHOUT_RESPONSE) != 0,
            notifiable: properties & (PROPERTY_NOTIFY | PROPERTY_INDICATE) != 0,
        }
    }

    /// True when the characteristic can be neither read, written nor subscribed to
    pub fn is_no_access(&self) -> bool {
        !(self.readable || self.writable || self.notifiable)
    }
}

/// A characteristic as reported by the radio, before it is attached to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub properties: u32,
}

/// One characteristic of a tracked service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicEntry {
    pub uuid: Uuid,
    /// UUID of the owning service
    pub service: Uuid,
    /// Raw property bitmask as reported by the radio
    pub properties: u32,
    /// Computed once at discovery time
    pub flags: CharacteristicFlags,
}

impl CharacteristicEntry {
    pub fn new(service: Uuid, discovered: DiscoveredCharacteristic) -> Self {
        Self {
            uuid: discovered.uuid,
            service,
            properties: discovered.properties,
            flags: CharacteristicFlags::from_properties(discovered.properties),
        }
    }
}

/// One service of the connected peripheral with its characteristics in discovery order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEntry {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicEntry>,
    /// Set once the radio reported this service's characteristics, even if there were none
    pub populated: bool,
}

impl ServiceEntry {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
            populated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{PROPERTY_BROADCAST, PROPERTY_EXTENDED_PROPERTIES};

    #[test]
    fn flags_follow_property_bits() {
        let flags = CharacteristicFlags::from_properties(PROPERTY_READ | PROPERTY_NOTIFY);
        assert!(flags.readable);
        assert!(!flags.writable);
        assert!(flags.notifiable);
        assert!(!flags.is_no_access());

        let flags = CharacteristicFlags::from_properties(PROPERTY_WRITE_WITHOUT_RESPONSE);
        assert!(flags.writable);

        let flags = CharacteristicFlags::from_properties(PROPERTY_INDICATE);
        assert!(flags.notifiable);
    }

    #[test]
    fn broadcast_only_characteristic_has_no_access() {
        let flags =
            CharacteristicFlags::from_properties(PROPERTY_BROADCAST | PROPERTY_EXTENDED_PROPERTIES);
        assert!(flags.is_no_access());
    }

    #[test]
    fn characteristic_entry_keeps_parent_and_bits() {
        let service = Uuid::from_u128(0x180f);
        let entry = CharacteristicEntry::new(
            service,
            DiscoveredCharacteristic {
                uuid: Uuid::from_u128(0x2a19),
                properties: PROPERTY_READ | PROPERTY_NOTIFY,
            },
        );
        assert_eq!(entry.service, service);
        assert_eq!(entry.properties, PROPERTY_READ | PROPERTY_NOTIFY);
        assert!(entry.flags.readable && entry.flags.notifiable);
    }
}
