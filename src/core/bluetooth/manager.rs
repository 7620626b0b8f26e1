//! Bluetooth manager
//! Owns one `ConnectionController` and runs its event loop: radio events in,
//! cooperative scan ticks and optional RSSI polling on timers.

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::AppConfig;
use crate::core::bluetooth::bluest_radio::BluestRadio;
use crate::core::bluetooth::connection::{ConnectionController, ControllerState};
use crate::core::bluetooth::discovery::DiscoverySession;
use crate::core::bluetooth::radio::{RadioAdapter, RadioEvent};
use crate::core::bluetooth::types::{PeripheralId, PeripheralRecord, ServiceEntry};

pub struct BluetoothManager<R: RadioAdapter> {
    controller: ConnectionController<R>,
    radio_events: UnboundedReceiver<RadioEvent>,
    config: AppConfig,
}

impl BluetoothManager<BluestRadio> {
    /// Creates a manager on top of the default system adapter
    pub async fn new(config: AppConfig) -> Result<Self> {
        let (radio, radio_events) = BluestRadio::open().await?;
        Ok(Self::with_radio(radio, radio_events, config))
    }
}

impl<R: RadioAdapter> BluetoothManager<R> {
    pub fn with_radio(radio: R, radio_events: UnboundedReceiver<RadioEvent>, config: AppConfig) -> Self {
        let controller = ConnectionController::new(radio, &config.scan);
        Self {
            controller,
            radio_events,
            config,
        }
    }

    pub fn controller(&self) -> &ConnectionController<R> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ConnectionController<R> {
        &mut self.controller
    }

    /// Scans for one full window and returns every connectable peripheral seen
    pub async fn scan(&mut self) -> Result<Vec<PeripheralRecord>> {
        self.scan_until(|_| false).await
    }

    /// Scans until the window elapses or `done` is satisfied
    pub async fn scan_until<F>(&mut self, mut done: F) -> Result<Vec<PeripheralRecord>>
    where
        F: FnMut(&DiscoverySession) -> bool,
    {
        self.controller.start_scan()?;

        let period = Duration::from_millis(self.config.scan.tick_interval_ms.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        ticker.tick().await;

        while *self.controller.state() == ControllerState::Scanning {
            tokio::select! {
                event = self.radio_events.recv() => {
                    let event = event.ok_or_else(|| anyhow!("Radio event channel closed"))?;
                    self.controller.handle_event(event);
                    if done(self.controller.discovery()) {
                        self.controller.stop_scan()?;
                    }
                }
                _ = ticker.tick() => {
                    self.controller.tick();
                }
            }
        }

        let records = self.controller.discovery().records().to_vec();
        info!("Scan finished with {} peripherals", records.len());
        Ok(records)
    }

    /// Connects to a discovered peripheral and waits for its complete profile
    pub async fn browse(&mut self, id: &PeripheralId) -> Result<Vec<ServiceEntry>> {
        self.controller.connect(id)?;

        let deadline = Duration::from_secs(self.config.connection.browse_timeout_secs);
        match tokio::time::timeout(deadline, self.wait_for_profile()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Timed out browsing {}", id);
                if let Err(e) = self.controller.disconnect() {
                    warn!("Failed to abandon connection: {}", e);
                }
                Err(anyhow!("Timed out browsing {}", id))
            }
        }
    }

    /// Drops the current link, if any
    pub fn disconnect(&mut self) -> Result<()> {
        self.controller.disconnect()?;
        Ok(())
    }

    async fn wait_for_profile(&mut self) -> Result<Vec<ServiceEntry>> {
        let poll_secs = self.config.connection.rssi_poll_interval_secs;
        let mut rssi_ticker = interval(Duration::from_secs(poll_secs.unwrap_or(1).max(1)));
        rssi_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            match self.controller.state() {
                ControllerState::Disconnected { reason, .. } => {
                    let reason = reason
                        .as_ref()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "disconnected".to_string());
                    return Err(anyhow!(reason));
                }
                ControllerState::BrowsingProfile { .. } => {
                    if let Some(profile) = self.controller.profile() {
                        if profile.is_complete() {
                            return Ok(profile.services().to_vec());
                        }
                    }
                }
                _ => {}
            }

            tokio::select! {
                event = self.radio_events.recv() => {
                    let event = event.ok_or_else(|| anyhow!("Radio event channel closed"))?;
                    self.controller.handle_event(event);
                }
                _ = rssi_ticker.tick(), if poll_secs.is_some() && self.controller.state().is_linked() => {
                    if let Err(e) = self.controller.read_rssi() {
                        warn!("RSSI poll skipped: {}", e);
                    }
                }
            }
        }
    }
}
