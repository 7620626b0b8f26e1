//! Bluetooth session core
//! Scanning, connection and GATT profile tracking on top of an abstract
//! radio, plus the bluest-backed radio used by the binary.

pub mod advertisement;
pub mod bluest_radio;
pub mod connection;
pub mod constants;
pub mod discovery;
pub mod events;
pub mod manager;
pub mod mock;
pub mod profile;
pub mod radio;
pub mod types;

// Re-export types that should be publicly accessible
pub use advertisement::resolve_display_name;
pub use bluest_radio::BluestRadio;
pub use connection::{ConnectionController, ControllerEvent, ControllerState};
pub use constants::*; // Re-export all constants
pub use discovery::{DiscoveryEvent, DiscoverySession};
pub use events::EventBus;
pub use manager::BluetoothManager;
pub use profile::{GattProfileTracker, ProfileEvent};
pub use radio::{RadioAdapter, RadioEvent, RequestToken};
pub use types::{
    Advertisement, CharacteristicEntry, CharacteristicFlags, DiscoveredCharacteristic, LinkState,
    PeripheralId, PeripheralRecord, ServiceEntry,
};
