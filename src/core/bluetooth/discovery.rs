//! Peripheral discovery bookkeeping for one scan window
//! Holds the deduplicated list of connectable peripherals in sighting order
//! and the cooperative countdown that ends the scan.

use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::bluetooth::events::EventBus;
use crate::core::bluetooth::types::{LinkState, PeripheralId, PeripheralRecord};

/// Notifications published by a `DiscoverySession`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DiscoveryEvent {
    ScanStarted { timeout_secs: u32 },
    ScanStopped,
    RecordsChanged { count: usize },
}

pub struct DiscoverySession {
    records: Vec<PeripheralRecord>,
    /// Position of each record in `records`
    index: HashMap<PeripheralId, usize>,
    countdown: u32,
    active: bool,
    events: EventBus<DiscoveryEvent>,
}

impl DiscoverySession {
    pub fn new(events: EventBus<DiscoveryEvent>) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            countdown: 0,
            active: false,
            events,
        }
    }

    /// Clears every record and opens a new scan window of `timeout_secs` ticks
    pub fn start(&mut self, timeout_secs: u32) {
        self.records.clear();
        self.index.clear();
        self.countdown = timeout_secs;
        self.active = true;
        info!("Discovery session started ({} s window)", timeout_secs);
        self.events.emit(DiscoveryEvent::ScanStarted { timeout_secs });
    }

    /// Advances the countdown by one second. Returns true when this tick
    /// expired the session.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.countdown = self.countdown.saturating_sub(1);
        debug!("{} seconds until scan ends", self.countdown);
        if self.countdown == 0 {
            self.stop();
            return true;
        }
        false
    }

    /// Freezes the record set
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        info!("Discovery session stopped with {} peripherals", self.records.len());
        self.events.emit(DiscoveryEvent::ScanStopped);
    }

    /// Adds a peripheral on its first connectable sighting. Later sightings of
    /// the same id do not refresh name or signal strength.
    pub fn record_sighting(
        &mut self,
        id: PeripheralId,
        rssi: i16,
        display_name: String,
        connectable: bool,
    ) -> bool {
        if !connectable {
            debug!("Ignoring non-connectable peripheral {}", id);
            return false;
        }
        if !self.active {
            debug!("Ignoring sighting of {} outside a scan window", id);
            return false;
        }
        if self.index.contains_key(&id) {
            return false;
        }

        info!("Discovered peripheral {} ({:?}), RSSI: {}", id, display_name, rssi);
        self.index.insert(id.clone(), self.records.len());
        self.records
            .push(PeripheralRecord::new(id, display_name, rssi, connectable));
        self.events.emit(DiscoveryEvent::RecordsChanged {
            count: self.records.len(),
        });
        true
    }

    /// Records in first-sighting order
    pub fn records(&self) -> &[PeripheralRecord] {
        &self.records
    }

    pub fn record(&self, id: &PeripheralId) -> Option<&PeripheralRecord> {
        self.index.get(id).map(|&position| &self.records[position])
    }

    /// Row lookup for list presentation
    pub fn record_at(&self, index: usize) -> Option<&PeripheralRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Updates the link state of a known record. Unknown ids are ignored.
    pub fn set_link_state(&mut self, id: &PeripheralId, state: LinkState) {
        if let Some(&position) = self.index.get(id) {
            self.records[position].link_state = state;
            self.events.emit(DiscoveryEvent::RecordsChanged {
                count: self.records.len(),
            });
        }
    }

    /// Stores an explicitly read RSSI value. Unknown ids are ignored.
    pub fn update_rssi(&mut self, id: &PeripheralId, rssi: i16) -> bool {
        match self.index.get(id) {
            Some(&position) => {
                self.records[position].rssi = rssi;
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DiscoverySession {
        DiscoverySession::new(EventBus::new(16))
    }

    fn sight(session: &mut DiscoverySession, id: &str, name: &str) -> bool {
        session.record_sighting(PeripheralId::new(id), -60, name.to_string(), true)
    }

    #[test]
    fn distinct_sightings_keep_first_sighting_order() {
        let mut session = session();
        session.start(5);
        for id in ["c", "a", "b"] {
            assert!(sight(&mut session, id, id));
        }

        let ids: Vec<&str> = session.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(session.record_at(1).map(|r| r.id.as_str()), Some("a"));
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn repeated_sighting_does_not_refresh_the_record() {
        let mut session = session();
        session.start(5);
        assert!(sight(&mut session, "A", "X"));
        assert!(!session.record_sighting(PeripheralId::new("A"), -30, "Y".to_string(), true));

        let record = session.record(&PeripheralId::new("A")).unwrap();
        assert_eq!(record.display_name, "X");
        assert_eq!(record.rssi, -60);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn non_connectable_sighting_is_never_recorded() {
        let mut session = session();
        session.start(5);
        assert!(!session.record_sighting(PeripheralId::new("beacon"), -40, "B".to_string(), false));
        assert!(session.is_empty());
    }

    #[test]
    fn countdown_expires_after_timeout_ticks() {
        let mut session = session();
        session.start(5);
        assert!(sight(&mut session, "A", "X"));
        sight(&mut session, "A", "Y");

        for _ in 0..4 {
            assert!(!session.tick());
            assert!(session.is_active());
        }
        assert!(session.tick());
        assert!(!session.is_active());
        assert_eq!(session.countdown(), 0);
        assert_eq!(session.record(&PeripheralId::new("A")).unwrap().display_name, "X");

        // further ticks are harmless
        assert!(!session.tick());
    }

    #[test]
    fn stopped_session_is_frozen() {
        let mut session = session();
        session.start(5);
        session.stop();
        assert!(!sight(&mut session, "late", "L"));
        assert!(session.is_empty());
    }

    #[test]
    fn restart_clears_records() {
        let mut session = session();
        session.start(5);
        sight(&mut session, "A", "X");
        session.start(3);
        assert!(session.is_empty());
        assert_eq!(session.countdown(), 3);
        assert!(sight(&mut session, "A", "Y"));
        assert_eq!(session.record(&PeripheralId::new("A")).unwrap().display_name, "Y");
    }

    #[test]
    fn link_state_and_rssi_updates() {
        let mut session = session();
        session.start(5);
        sight(&mut session, "A", "X");
        session.stop();

        let id = PeripheralId::new("A");
        session.set_link_state(&id, LinkState::Connecting);
        assert!(session.update_rssi(&id, -42));
        assert!(!session.update_rssi(&PeripheralId::new("missing"), -42));

        let record = session.record(&id).unwrap();
        assert_eq!(record.link_state, LinkState::Connecting);
        assert_eq!(record.rssi, -42);
    }

    #[tokio::test]
    async fn lifecycle_is_published() {
        let mut session = session();
        let mut rx = session.subscribe();

        session.start(1);
        sight(&mut session, "A", "X");
        session.tick();

        assert_eq!(rx.recv().await.unwrap(), DiscoveryEvent::ScanStarted { timeout_secs: 1 });
        assert_eq!(rx.recv().await.unwrap(), DiscoveryEvent::RecordsChanged { count: 1 });
        assert_eq!(rx.recv().await.unwrap(), DiscoveryEvent::ScanStopped);
    }
}
