//! The boundary to the platform Bluetooth stack
//! Commands are fire-and-forget. Their outcomes come back later as
//! `RadioEvent`s tagged with the token the command was issued under.

use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::types::{Advertisement, DiscoveredCharacteristic, PeripheralId};
use crate::error::ProfileScope;

/// Generation tag for one scan window or one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestToken(pub u64);

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a radio command, or a spontaneous radio notification
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// The radio was powered on or off
    AvailabilityChanged(bool),
    Discovered {
        token: RequestToken,
        id: PeripheralId,
        /// Name the device itself reports, as opposed to the advertised one
        device_name: Option<String>,
        advertisement: Advertisement,
        rssi: i16,
    },
    Connected {
        token: RequestToken,
        id: PeripheralId,
    },
    ConnectFailed {
        token: RequestToken,
        id: PeripheralId,
        reason: String,
    },
    Disconnected {
        token: RequestToken,
        id: PeripheralId,
        reason: Option<String>,
    },
    ServicesDiscovered {
        token: RequestToken,
        id: PeripheralId,
        services: Vec<Uuid>,
    },
    CharacteristicsDiscovered {
        token: RequestToken,
        id: PeripheralId,
        service: Uuid,
        characteristics: Vec<DiscoveredCharacteristic>,
    },
    DiscoveryFailed {
        token: RequestToken,
        id: PeripheralId,
        scope: ProfileScope,
        reason: String,
    },
    RssiRead {
        token: RequestToken,
        id: PeripheralId,
        rssi: i16,
    },
}

impl RadioEvent {
    /// Token the event answers, `None` for spontaneous notifications
    pub fn token(&self) -> Option<RequestToken> {
        match self {
            Self::AvailabilityChanged(_) => None,
            Self::Discovered { token, .. }
            | Self::Connected { token, .. }
            | Self::ConnectFailed { token, .. }
            | Self::Disconnected { token, .. }
            | Self::ServicesDiscovered { token, .. }
            | Self::CharacteristicsDiscovered { token, .. }
            | Self::DiscoveryFailed { token, .. }
            | Self::RssiRead { token, .. } => Some(*token),
        }
    }
}

/// Capability the platform must supply.
///
/// An `Err` only means the command could not be dispatched at all; failures
/// of the operation itself arrive as events.
pub trait RadioAdapter {
    /// Starts scanning; every sighting is reported as `Discovered` under `token`
    fn start_scan(&mut self, token: RequestToken) -> Result<()>;

    fn stop_scan(&mut self);

    fn connect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()>;

    fn disconnect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()>;

    fn discover_services(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()>;

    fn discover_characteristics(
        &mut self,
        token: RequestToken,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<()>;

    fn read_rssi(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()>;
}
