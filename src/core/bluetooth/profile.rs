//! GATT profile of the connected peripheral
//! Services are sections, characteristics are rows. Every lookup is bounds
//! checked; out-of-range indices answer empty instead of failing, since they
//! come from a presentation layer that may be rendering a stale profile.

use log::{debug, info};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::bluetooth::events::EventBus;
use crate::core::bluetooth::types::{CharacteristicEntry, DiscoveredCharacteristic, ServiceEntry};

/// Notifications published by a `GattProfileTracker`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ProfileEvent {
    ServicesChanged { count: usize },
    CharacteristicsChanged { service: Uuid, count: usize },
}

pub struct GattProfileTracker {
    services: Vec<ServiceEntry>,
    /// False until the first `set_services`
    services_known: bool,
    events: EventBus<ProfileEvent>,
}

impl GattProfileTracker {
    pub fn new(events: EventBus<ProfileEvent>) -> Self {
        Self {
            services: Vec::new(),
            services_known: false,
            events,
        }
    }

    /// Replaces the tracked services wholesale, in the order given
    pub fn set_services(&mut self, services: Vec<Uuid>) {
        info!("Tracking {} services", services.len());
        self.services = services.into_iter().map(ServiceEntry::new).collect();
        self.services_known = true;
        self.events.emit(ProfileEvent::ServicesChanged {
            count: self.services.len(),
        });
    }

    /// Attaches characteristics to a tracked service. Returns false without
    /// touching anything when the service is unknown or already populated.
    pub fn set_characteristics(
        &mut self,
        service: Uuid,
        characteristics: Vec<DiscoveredCharacteristic>,
    ) -> bool {
        let Some(entry) = self.services.iter_mut().find(|s| s.uuid == service) else {
            debug!("Ignoring characteristics for untracked service {}", service);
            return false;
        };
        if entry.populated {
            debug!("Service {} already populated, ignoring repeat", service);
            return false;
        }

        entry.characteristics = characteristics
            .into_iter()
            .map(|c| CharacteristicEntry::new(service, c))
            .collect();
        entry.populated = true;
        info!(
            "Service {} has {} characteristics",
            service,
            entry.characteristics.len()
        );
        let count = entry.characteristics.len();
        self.events
            .emit(ProfileEvent::CharacteristicsChanged { service, count });
        true
    }

    pub fn section_count(&self) -> usize {
        self.services.len()
    }

    /// Characteristic count of a section, 0 when out of bounds
    pub fn row_count(&self, section: usize) -> usize {
        self.services
            .get(section)
            .map_or(0, |service| service.characteristics.len())
    }

    pub fn item_at(&self, section: usize, row: usize) -> Option<&CharacteristicEntry> {
        self.services.get(section)?.characteristics.get(row)
    }

    /// Section header text: the service UUID
    pub fn section_title(&self, section: usize) -> Option<String> {
        self.services.get(section).map(|service| service.uuid.to_string())
    }

    pub fn service_at(&self, section: usize) -> Option<&ServiceEntry> {
        self.services.get(section)
    }

    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// True once services are known and every one of them has reported its characteristics
    pub fn is_complete(&self) -> bool {
        self.services_known && self.services.iter().all(|service| service.populated)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{PROPERTY_NOTIFY, PROPERTY_READ, PROPERTY_WRITE};

    const BATTERY: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
    const DEVICE_INFO: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

    fn characteristic(id: u128, properties: u32) -> DiscoveredCharacteristic {
        DiscoveredCharacteristic {
            uuid: Uuid::from_u128(id),
            properties,
        }
    }

    fn tracker() -> GattProfileTracker {
        let mut tracker = GattProfileTracker::new(EventBus::new(8));
        tracker.set_services(vec![BATTERY, DEVICE_INFO]);
        tracker
    }

    #[test]
    fn sections_and_rows_follow_the_profile() {
        let mut tracker = tracker();
        assert!(tracker.set_characteristics(
            DEVICE_INFO,
            vec![characteristic(0x2a29, PROPERTY_READ), characteristic(0x2a24, PROPERTY_READ)],
        ));

        assert_eq!(tracker.section_count(), 2);
        assert_eq!(tracker.row_count(0), 0);
        assert_eq!(tracker.row_count(1), 2);
        assert_eq!(tracker.item_at(1, 1).unwrap().uuid, Uuid::from_u128(0x2a24));
        assert_eq!(tracker.item_at(1, 1).unwrap().service, DEVICE_INFO);
        assert_eq!(tracker.section_title(0), Some(BATTERY.to_string()));
    }

    #[test]
    fn out_of_bounds_lookups_are_empty() {
        let tracker = tracker();
        for section in 2..10 {
            assert_eq!(tracker.row_count(section), 0);
            assert!(tracker.section_title(section).is_none());
        }
        assert!(tracker.item_at(0, 0).is_none());
        assert!(tracker.item_at(7, 0).is_none());
        assert!(tracker.service_at(2).is_none());
    }

    #[test]
    fn service_at_returns_the_section() {
        let mut tracker = tracker();
        tracker.set_characteristics(BATTERY, vec![characteristic(0x2a19, PROPERTY_READ)]);

        let battery = tracker.service_at(0).unwrap();
        assert_eq!(battery.uuid, BATTERY);
        assert!(battery.populated);
        assert_eq!(battery.characteristics.len(), 1);

        let device_info = tracker.service_at(1).unwrap();
        assert_eq!(device_info.uuid, DEVICE_INFO);
        assert!(!device_info.populated);
    }

    #[test]
    fn untracked_service_leaves_tracker_unchanged() {
        let mut tracker = tracker();
        let before = tracker.services().to_vec();
        assert!(!tracker.set_characteristics(
            Uuid::from_u128(0xdead),
            vec![characteristic(0x2a00, PROPERTY_WRITE)],
        ));
        assert_eq!(tracker.services(), before.as_slice());
    }

    #[test]
    fn populated_service_is_not_overwritten() {
        let mut tracker = tracker();
        tracker.set_characteristics(BATTERY, vec![characteristic(0x2a19, PROPERTY_READ | PROPERTY_NOTIFY)]);
        assert!(!tracker.set_characteristics(BATTERY, vec![]));
        assert_eq!(tracker.row_count(0), 1);
        assert!(tracker.item_at(0, 0).unwrap().flags.notifiable);
    }

    #[test]
    fn empty_characteristic_list_still_completes_the_service() {
        let mut tracker = tracker();
        assert!(!tracker.is_complete());
        assert!(tracker.set_characteristics(BATTERY, vec![]));
        assert!(!tracker.set_characteristics(BATTERY, vec![characteristic(0x2a19, PROPERTY_READ)]));
        assert!(!tracker.is_complete());
        tracker.set_characteristics(DEVICE_INFO, vec![characteristic(0x2a29, PROPERTY_READ)]);
        assert!(tracker.is_complete());
        assert_eq!(tracker.row_count(0), 0);
    }

    #[test]
    fn fresh_tracker_is_not_complete() {
        let mut tracker = GattProfileTracker::new(EventBus::new(1));
        assert!(!tracker.is_complete());
        tracker.set_services(vec![]);
        assert!(tracker.is_complete());
    }

    #[test]
    fn set_services_replaces_everything() {
        let mut tracker = tracker();
        tracker.set_characteristics(BATTERY, vec![characteristic(0x2a19, PROPERTY_READ)]);
        tracker.set_services(vec![DEVICE_INFO]);
        assert_eq!(tracker.section_count(), 1);
        assert_eq!(tracker.row_count(0), 0);
    }

    #[tokio::test]
    async fn changes_are_published() {
        let mut tracker = GattProfileTracker::new(EventBus::new(8));
        let mut rx = tracker.subscribe();
        tracker.set_services(vec![BATTERY]);
        tracker.set_characteristics(BATTERY, vec![characteristic(0x2a19, PROPERTY_READ)]);

        assert_eq!(rx.recv().await.unwrap(), ProfileEvent::ServicesChanged { count: 1 });
        assert_eq!(
            rx.recv().await.unwrap(),
            ProfileEvent::CharacteristicsChanged { service: BATTERY, count: 1 }
        );
    }
}
