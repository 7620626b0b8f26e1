//! Connection state machine
//! Drives one radio through scan, connect and profile browsing. Every scan
//! window and connection attempt gets a fresh `RequestToken`; events for a
//! superseded token are dropped so late callbacks cannot resurrect state.

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::scan_config::ScanConfig;
use crate::core::bluetooth::advertisement::resolve_display_name;
use crate::core::bluetooth::discovery::{DiscoveryEvent, DiscoverySession};
use crate::core::bluetooth::events::EventBus;
use crate::core::bluetooth::profile::{GattProfileTracker, ProfileEvent};
use crate::core::bluetooth::radio::{RadioAdapter, RadioEvent, RequestToken};
use crate::core::bluetooth::types::{CharacteristicEntry, LinkState, PeripheralId};
use crate::error::{ProfileScope, RejectCause, SessionError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControllerState {
    Idle,
    Scanning,
    Connecting { peripheral: PeripheralId },
    Connected { peripheral: PeripheralId },
    BrowsingProfile { peripheral: PeripheralId },
    /// `reason` is `None` when the user asked for the disconnect
    Disconnected {
        peripheral: PeripheralId,
        reason: Option<SessionError>,
    },
}

impl ControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::BrowsingProfile { .. } => "browsing profile",
            Self::Disconnected { .. } => "disconnected",
        }
    }

    /// The peripheral this state is about, if any
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            Self::Idle | Self::Scanning => None,
            Self::Connecting { peripheral }
            | Self::Connected { peripheral }
            | Self::BrowsingProfile { peripheral }
            | Self::Disconnected { peripheral, .. } => Some(peripheral),
        }
    }

    /// True while a link is established, profile or not
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::BrowsingProfile { .. })
    }
}

/// Notifications published by the `ConnectionController`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControllerEvent {
    StateChanged(ControllerState),
    RssiUpdated { id: PeripheralId, rssi: i16 },
    CharacteristicSelected(CharacteristicEntry),
}

pub struct ConnectionController<R: RadioAdapter> {
    radio: R,
    scan_timeout_secs: u32,
    state: ControllerState,
    discovery: DiscoverySession,
    /// Present from `Connected` until the link goes away
    profile: Option<GattProfileTracker>,
    profile_events: EventBus<ProfileEvent>,
    events: EventBus<ControllerEvent>,
    generation: u64,
    scan_token: Option<RequestToken>,
    link_token: Option<RequestToken>,
    radio_available: bool,
    selected: Option<CharacteristicEntry>,
}

impl<R: RadioAdapter> ConnectionController<R> {
    pub fn new(radio: R, config: &ScanConfig) -> Self {
        Self {
            radio,
            scan_timeout_secs: config.scan_timeout_secs,
            state: ControllerState::Idle,
            discovery: DiscoverySession::new(EventBus::new(config.event_capacity)),
            profile: None,
            profile_events: EventBus::new(config.event_capacity),
            events: EventBus::new(config.event_capacity),
            generation: 0,
            scan_token: None,
            link_token: None,
            radio_available: true,
            selected: None,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn discovery(&self) -> &DiscoverySession {
        &self.discovery
    }

    /// Profile of the connected peripheral, `None` when not linked
    pub fn profile(&self) -> Option<&GattProfileTracker> {
        self.profile.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn is_radio_available(&self) -> bool {
        self.radio_available
    }

    pub fn selected_characteristic(&self) -> Option<&CharacteristicEntry> {
        self.selected.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_discovery(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.discovery.subscribe()
    }

    /// Profile events outlive individual trackers, so subscribe here rather
    /// than on the tracker itself.
    pub fn subscribe_profile(&self) -> broadcast::Receiver<ProfileEvent> {
        self.profile_events.subscribe()
    }

    /// Opens a new scan window, restarting the current one if already scanning
    pub fn start_scan(&mut self) -> Result<(), SessionError> {
        self.ensure_radio_available()?;
        match self.state {
            ControllerState::Idle => {}
            ControllerState::Scanning => {
                info!("Restarting scan");
                self.halt_scan();
            }
            ref other => return Err(RejectCause::InvalidState(other.name()).into()),
        }

        let token = self.next_token();
        if let Err(e) = self.radio.start_scan(token) {
            warn!("Radio refused to start scanning: {}", e);
            self.set_state(ControllerState::Idle);
            return Err(SessionError::ScanFailed(e.to_string()));
        }

        self.scan_token = Some(token);
        self.discovery.start(self.scan_timeout_secs);
        self.set_state(ControllerState::Scanning);
        Ok(())
    }

    pub fn stop_scan(&mut self) -> Result<(), SessionError> {
        if self.state == ControllerState::Scanning {
            self.halt_scan();
            self.set_state(ControllerState::Idle);
        } else {
            debug!("stop_scan ignored while {}", self.state.name());
        }
        Ok(())
    }

    /// Starts scanning when idle, stops when scanning
    pub fn toggle_scan(&mut self) -> Result<(), SessionError> {
        if self.state == ControllerState::Scanning {
            self.stop_scan()
        } else {
            self.start_scan()
        }
    }

    /// One elapsed second of the scan window. Returns true when the scan
    /// expired on this tick.
    pub fn tick(&mut self) -> bool {
        if self.state != ControllerState::Scanning {
            return false;
        }
        if !self.discovery.tick() {
            return false;
        }
        info!("Scan window elapsed");
        self.radio.stop_scan();
        self.scan_token = None;
        self.set_state(ControllerState::Idle);
        true
    }

    /// Starts a single connection attempt to a discovered peripheral
    pub fn connect(&mut self, id: &PeripheralId) -> Result<(), SessionError> {
        self.ensure_radio_available()?;
        match self.state {
            ControllerState::Idle | ControllerState::Scanning => {}
            ControllerState::Connecting { .. } => return Err(RejectCause::ConnectInFlight.into()),
            ControllerState::Connected { .. } | ControllerState::BrowsingProfile { .. } => {
                return Err(RejectCause::AlreadyConnected.into());
            }
            ref other => return Err(RejectCause::InvalidState(other.name()).into()),
        }
        if self.discovery.record(id).is_none() {
            return Err(RejectCause::UnknownPeripheral(id.clone()).into());
        }

        if self.state == ControllerState::Scanning {
            self.halt_scan();
        }

        let token = self.next_token();
        self.link_token = Some(token);
        self.discovery.set_link_state(id, LinkState::Connecting);
        self.set_state(ControllerState::Connecting {
            peripheral: id.clone(),
        });

        info!("Initiating connection to {} ({})", id, token);
        if let Err(e) = self.radio.connect(token, id) {
            let error = SessionError::ConnectFailed(e.to_string());
            self.fail_link(id.clone(), error.clone());
            return Err(error);
        }
        Ok(())
    }

    /// Drops the link or abandons the attempt in flight
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        let peripheral = match &self.state {
            ControllerState::Connecting { peripheral }
            | ControllerState::Connected { peripheral }
            | ControllerState::BrowsingProfile { peripheral } => peripheral.clone(),
            _ => return Err(RejectCause::NotConnected.into()),
        };

        if let Some(token) = self.link_token.take() {
            info!("Disconnecting from {} ({})", peripheral, token);
            if let Err(e) = self.radio.disconnect(token, &peripheral) {
                warn!("Radio refused to disconnect {}: {}", peripheral, e);
            }
        }
        self.close_link(peripheral, None);
        Ok(())
    }

    /// Acknowledges a `Disconnected` state and returns to `Idle`
    pub fn dismiss(&mut self) -> Result<(), SessionError> {
        match self.state {
            ControllerState::Disconnected { .. } => {
                self.set_state(ControllerState::Idle);
                Ok(())
            }
            ref other => Err(RejectCause::InvalidState(other.name()).into()),
        }
    }

    /// Asks the radio for the current signal strength of the linked peripheral
    pub fn read_rssi(&mut self) -> Result<(), SessionError> {
        let (Some(token), Some(peripheral)) = (self.link_token, self.linked_peripheral()) else {
            return Err(RejectCause::NotConnected.into());
        };
        if let Err(e) = self.radio.read_rssi(token, &peripheral) {
            warn!("Failed to request RSSI for {}: {}", peripheral, e);
        }
        Ok(())
    }

    /// Remembers the characteristic at the given profile position
    pub fn select_characteristic(&mut self, section: usize, row: usize) -> Option<&CharacteristicEntry> {
        let entry = self.profile.as_ref()?.item_at(section, row)?.clone();
        info!("Selected characteristic {} of service {}", entry.uuid, entry.service);
        self.events
            .emit(ControllerEvent::CharacteristicSelected(entry.clone()));
        self.selected = Some(entry);
        self.selected.as_ref()
    }

    /// Feeds one radio callback into the state machine
    pub fn handle_event(&mut self, event: RadioEvent) {
        if let RadioEvent::AvailabilityChanged(available) = event {
            self.on_availability_changed(available);
            return;
        }

        if let RadioEvent::Discovered {
            token,
            id,
            device_name,
            advertisement,
            rssi,
        } = event
        {
            if self.scan_token != Some(token) {
                debug!("Dropping sighting of {} from superseded scan {}", id, token);
                return;
            }
            let name = resolve_display_name(&advertisement, device_name.as_deref());
            self.discovery
                .record_sighting(id, rssi, name, advertisement.is_connectable);
            return;
        }

        let Some(token) = event.token() else {
            return;
        };
        if self.link_token != Some(token) {
            self.on_stale_event(event);
            return;
        }

        match event {
            RadioEvent::Connected { token, id } => self.on_connected(token, id),
            RadioEvent::ConnectFailed { id, reason, .. } => {
                if matches!(self.state, ControllerState::Connecting { .. }) {
                    warn!("Connection to {} failed: {}", id, reason);
                    self.fail_link(id, SessionError::ConnectFailed(reason));
                }
            }
            RadioEvent::Disconnected { id, reason, .. } => {
                warn!("Peripheral {} disconnected: {:?}", id, reason);
                self.fail_link(id, SessionError::DisconnectedUnexpectedly(reason));
            }
            RadioEvent::ServicesDiscovered {
                token,
                id,
                services,
            } => self.on_services(token, id, services),
            RadioEvent::CharacteristicsDiscovered {
                service,
                characteristics,
                ..
            } => {
                if let Some(profile) = self.profile.as_mut() {
                    profile.set_characteristics(service, characteristics);
                }
            }
            RadioEvent::DiscoveryFailed {
                token,
                id,
                scope,
                reason,
            } => {
                if self.state.is_linked() {
                    self.fail_profile(token, id, scope, reason);
                }
            }
            RadioEvent::RssiRead { id, rssi, .. } => {
                if self.discovery.update_rssi(&id, rssi) {
                    debug!("RSSI of {} is now {}", id, rssi);
                }
                self.events.emit(ControllerEvent::RssiUpdated { id, rssi });
            }
            RadioEvent::AvailabilityChanged(_) | RadioEvent::Discovered { .. } => {}
        }
    }

    fn on_availability_changed(&mut self, available: bool) {
        if available == self.radio_available {
            return;
        }
        self.radio_available = available;
        if available {
            info!("Bluetooth radio powered on and ready");
        } else {
            warn!("Bluetooth radio unavailable");
            if self.state == ControllerState::Scanning {
                self.halt_scan();
                self.set_state(ControllerState::Idle);
            }
        }
    }

    fn on_stale_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Connected { token, id } => {
                let current = matches!(
                    self.state,
                    ControllerState::Connecting { .. }
                        | ControllerState::Connected { .. }
                        | ControllerState::BrowsingProfile { .. }
                ) && self.state.peripheral() == Some(&id);
                if current {
                    // same device as the attempt in flight, the link is shared
                    debug!("Ignoring late connection to {} ({}), attempt in progress", id, token);
                    return;
                }
                // The attempt was abandoned but the radio went ahead anyway.
                info!("Late connection to {} ({}), dropping it", id, token);
                if let Err(e) = self.radio.disconnect(token, &id) {
                    warn!("Failed to drop orphaned link to {}: {}", id, e);
                }
            }
            other => debug!("Ignoring stale radio event: {:?}", other),
        }
    }

    fn on_connected(&mut self, token: RequestToken, id: PeripheralId) {
        if !matches!(self.state, ControllerState::Connecting { .. }) {
            debug!("Ignoring duplicate connect notification for {}", id);
            return;
        }
        info!("Connected to {}, discovering services...", id);
        self.discovery.set_link_state(&id, LinkState::Connected);
        self.profile = Some(GattProfileTracker::new(self.profile_events.clone()));
        self.set_state(ControllerState::Connected {
            peripheral: id.clone(),
        });

        if let Err(e) = self.radio.discover_services(token, &id) {
            self.fail_profile(token, id, ProfileScope::Services, e.to_string());
        }
    }

    fn on_services(&mut self, token: RequestToken, id: PeripheralId, services: Vec<Uuid>) {
        if !self.state.is_linked() {
            return;
        }
        let Some(profile) = self.profile.as_mut() else {
            return;
        };
        profile.set_services(services.clone());
        if matches!(self.state, ControllerState::Connected { .. }) {
            self.set_state(ControllerState::BrowsingProfile {
                peripheral: id.clone(),
            });
        }

        for service in services {
            if let Err(e) = self.radio.discover_characteristics(token, &id, service) {
                self.fail_profile(
                    token,
                    id,
                    ProfileScope::Characteristics(service),
                    e.to_string(),
                );
                return;
            }
        }
    }

    /// Profile discovery cannot continue: drop the link and report why
    fn fail_profile(
        &mut self,
        token: RequestToken,
        id: PeripheralId,
        scope: ProfileScope,
        reason: String,
    ) {
        warn!("Profile discovery of {} failed for {}: {}", id, scope, reason);
        if let Err(e) = self.radio.disconnect(token, &id) {
            warn!("Failed to disconnect {} after discovery error: {}", id, e);
        }
        self.fail_link(id, SessionError::ProfileDiscoveryFailed { scope, reason });
    }

    fn fail_link(&mut self, id: PeripheralId, error: SessionError) {
        self.link_token = None;
        self.close_link(id, Some(error));
    }

    fn close_link(&mut self, id: PeripheralId, reason: Option<SessionError>) {
        self.profile = None;
        self.selected = None;
        self.discovery.set_link_state(&id, LinkState::Disconnected);
        self.set_state(ControllerState::Disconnected {
            peripheral: id,
            reason,
        });
    }

    fn halt_scan(&mut self) {
        self.radio.stop_scan();
        self.discovery.stop();
        self.scan_token = None;
    }

    fn linked_peripheral(&self) -> Option<PeripheralId> {
        match &self.state {
            ControllerState::Connected { peripheral }
            | ControllerState::BrowsingProfile { peripheral } => Some(peripheral.clone()),
            _ => None,
        }
    }

    fn ensure_radio_available(&self) -> Result<(), SessionError> {
        if self.radio_available {
            Ok(())
        } else {
            Err(RejectCause::RadioUnavailable.into())
        }
    }

    fn next_token(&mut self) -> RequestToken {
        self.generation += 1;
        RequestToken(self.generation)
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            info!("Controller state: {} -> {}", self.state.name(), state.name());
        }
        self.state = state.clone();
        self.events.emit(ControllerEvent::StateChanged(state));
    }
}
