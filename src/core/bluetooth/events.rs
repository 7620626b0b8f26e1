//! Observer fan-out for the session core
//! Components publish through an `EventBus` and callers `subscribe` to it,
//! each subscriber getting its own copy of every event.

use log::debug;
use std::fmt::Debug;
use tokio::sync::broadcast;

/// A broadcast channel wrapper. Publishing never fails: events sent while
/// nobody listens are dropped.
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Debug> EventBus<E> {
    /// Creates a bus whose subscribers can lag `capacity` events behind
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns a receiver for every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Publishes an event to all current subscribers
    pub fn emit(&self, event: E) {
        if let Err(e) = self.tx.send(event) {
            debug!("Event dropped, no subscribers: {:?}", e.0);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_gets_the_event() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();

        bus.emit("scan-start");

        assert_eq!(first.recv().await.unwrap(), "scan-start");
        assert_eq!(second.recv().await.unwrap(), "scan-start");
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus: EventBus<u32> = EventBus::new(0);
        bus.emit(1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
