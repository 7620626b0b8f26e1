//! `RadioAdapter` backed by the bluest crate
//! Every command spawns a tokio task that talks to the platform stack and
//! reports the outcome on the radio event channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use bluest::{Adapter, AdapterEvent, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::{BLUETOOTH_OPERATION_TIMEOUT_SECS, UNKNOWN_RSSI};
use crate::core::bluetooth::radio::{RadioAdapter, RadioEvent, RequestToken};
use crate::core::bluetooth::types::{Advertisement, DiscoveredCharacteristic, PeripheralId};
use crate::error::ProfileScope;

type DeviceMap = Arc<Mutex<HashMap<PeripheralId, Device>>>;

pub struct BluestRadio {
    adapter: Adapter,
    /// Devices seen while scanning, needed to connect by id later
    devices: DeviceMap,
    events: UnboundedSender<RadioEvent>,
    scan_cancel: CancellationToken,
    /// Connection watchers, one per connection attempt
    links: HashMap<RequestToken, CancellationToken>,
}

impl BluestRadio {
    /// Opens the default adapter and waits until it is powered on
    pub async fn open() -> Result<(Self, UnboundedReceiver<RadioEvent>)> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::watch_availability(adapter.clone(), tx.clone()));

        let radio = Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            events: tx,
            scan_cancel: CancellationToken::new(),
            links: HashMap::new(),
        };
        Ok((radio, rx))
    }

    fn device(&self, id: &PeripheralId) -> Result<Device> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Device not found with ID: {}", id))
    }

    async fn watch_availability(adapter: Adapter, tx: UnboundedSender<RadioEvent>) {
        let events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to watch adapter events: {}", e);
                return;
            }
        };
        tokio::pin!(events);
        while let Some(event) = events.next().await {
            let available = match event {
                Ok(AdapterEvent::Available) => true,
                Ok(AdapterEvent::Unavailable) => false,
                Err(e) => {
                    error!("Error in adapter event stream: {}", e);
                    continue;
                }
            };
            if tx.send(RadioEvent::AvailabilityChanged(available)).is_err() {
                break;
            }
        }
    }

    async fn scan_task(
        adapter: Adapter,
        devices: DeviceMap,
        tx: UnboundedSender<RadioEvent>,
        token: RequestToken,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!("Starting bluetooth scan {}", token);
        let scan_stream = adapter.scan(&[]).await?;
        tokio::pin!(scan_stream);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    let Some(discovered) = result else {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    };
                    let device = discovered.device;
                    let id = PeripheralId::new(device.id().to_string());
                    debug!("Found device - ID: {}, RSSI: {:?}", id, discovered.rssi);
                    let rssi = discovered.rssi.unwrap_or_else(|| {
                        debug!("No RSSI reported for {}", id);
                        UNKNOWN_RSSI
                    });

                    let advertisement = Advertisement {
                        local_name: discovered.adv_data.local_name,
                        is_connectable: discovered.adv_data.is_connectable,
                    };
                    let device_name = device.name().ok();
                    devices
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(id.clone(), device);

                    let event = RadioEvent::Discovered {
                        token,
                        id,
                        device_name,
                        advertisement,
                        rssi,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
        info!("Bluetooth scan {} finished", token);
        Ok(())
    }

    async fn connect_task(
        adapter: Adapter,
        device: Device,
        tx: UnboundedSender<RadioEvent>,
        token: RequestToken,
        id: PeripheralId,
        cancel: CancellationToken,
    ) {
        Self::watch_connection(adapter, device, tx, token, id, cancel.clone()).await;
        // marks the watcher as finished
        cancel.cancel();
    }

    async fn watch_connection(
        adapter: Adapter,
        device: Device,
        tx: UnboundedSender<RadioEvent>,
        token: RequestToken,
        id: PeripheralId,
        cancel: CancellationToken,
    ) {
        let timeout = Duration::from_secs(BLUETOOTH_OPERATION_TIMEOUT_SECS);
        let outcome = match tokio::time::timeout(timeout, adapter.connect_device(&device)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timeout".to_string()),
        };

        if let Err(reason) = outcome {
            warn!("Connection to {} failed: {}", id, reason);
            let _ = tx.send(RadioEvent::ConnectFailed { token, id, reason });
            return;
        }

        info!("Connection to {} successful", id);
        if tx
            .send(RadioEvent::Connected {
                token,
                id: id.clone(),
            })
            .is_err()
        {
            return;
        }

        let connection_events = match adapter.device_connection_events(&device).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Cannot watch connection state of {}: {}", id, e);
                return;
            }
        };
        tokio::pin!(connection_events);
        loop {
            tokio::select! {
                event = connection_events.next() => match event {
                    Some(ConnectionEvent::Disconnected) => {
                        let _ = tx.send(RadioEvent::Disconnected { token, id, reason: None });
                        break;
                    }
                    Some(ConnectionEvent::Connected) => {}
                    None => {
                        let reason = Some("connection event stream ended".to_string());
                        let _ = tx.send(RadioEvent::Disconnected { token, id, reason });
                        break;
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }
    }

    async fn characteristics_of(
        device: &Device,
        service: Uuid,
    ) -> Result<Vec<DiscoveredCharacteristic>> {
        let services = device.services().await?;
        let service = services
            .into_iter()
            .find(|s| s.uuid() == service)
            .ok_or_else(|| anyhow!("Service not found: {}", service))?;

        let mut discovered = Vec::new();
        for characteristic in service.characteristics().await? {
            let properties = match characteristic.properties().await {
                Ok(properties) => properties.to_bits(),
                Err(e) => {
                    warn!("Cannot read properties of {}: {}", characteristic.uuid(), e);
                    0
                }
            };
            discovered.push(DiscoveredCharacteristic {
                uuid: characteristic.uuid(),
                properties,
            });
        }
        Ok(discovered)
    }
}

impl RadioAdapter for BluestRadio {
    fn start_scan(&mut self, token: RequestToken) -> Result<()> {
        let handle = Handle::try_current()?;
        self.scan_cancel.cancel();
        self.scan_cancel = CancellationToken::new();

        let task = Self::scan_task(
            self.adapter.clone(),
            self.devices.clone(),
            self.events.clone(),
            token,
            self.scan_cancel.clone(),
        );
        handle.spawn(async move {
            if let Err(e) = task.await {
                error!("Scan task finished with an error: {:?}", e);
            }
        });
        Ok(())
    }

    fn stop_scan(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.scan_cancel.cancel();
    }

    fn connect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        let handle = Handle::try_current()?;
        let device = self.device(id)?;
        self.links.retain(|_, watcher| !watcher.is_cancelled());
        let watcher = CancellationToken::new();
        self.links.insert(token, watcher.clone());

        info!("Initiating connection to {}...", id);
        handle.spawn(Self::connect_task(
            self.adapter.clone(),
            device,
            self.events.clone(),
            token,
            id.clone(),
            watcher,
        ));
        Ok(())
    }

    fn disconnect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        let handle = Handle::try_current()?;
        let device = self.device(id)?;
        if let Some(watcher) = self.links.remove(&token) {
            watcher.cancel();
        }

        let adapter = self.adapter.clone();
        let tx = self.events.clone();
        let id = id.clone();
        handle.spawn(async move {
            info!("Disconnecting from device {}", id);
            let reason = match adapter.disconnect_device(&device).await {
                Ok(()) => {
                    info!("Successfully disconnected");
                    None
                }
                Err(e) => {
                    error!("Failed to disconnect {}: {}", id, e);
                    Some(e.to_string())
                }
            };
            let _ = tx.send(RadioEvent::Disconnected { token, id, reason });
        });
        Ok(())
    }

    fn discover_services(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        let handle = Handle::try_current()?;
        let device = self.device(id)?;
        let tx = self.events.clone();
        let id = id.clone();
        handle.spawn(async move {
            let event = match device.services().await {
                Ok(services) => {
                    let services: Vec<Uuid> = services.iter().map(|s| s.uuid()).collect();
                    for service in &services {
                        info!("Available service: {}", service);
                    }
                    RadioEvent::ServicesDiscovered { token, id, services }
                }
                Err(e) => RadioEvent::DiscoveryFailed {
                    token,
                    id,
                    scope: ProfileScope::Services,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        token: RequestToken,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<()> {
        let handle = Handle::try_current()?;
        let device = self.device(id)?;
        let tx = self.events.clone();
        let id = id.clone();
        handle.spawn(async move {
            let event = match Self::characteristics_of(&device, service).await {
                Ok(characteristics) => RadioEvent::CharacteristicsDiscovered {
                    token,
                    id,
                    service,
                    characteristics,
                },
                Err(e) => RadioEvent::DiscoveryFailed {
                    token,
                    id,
                    scope: ProfileScope::Characteristics(service),
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
        Ok(())
    }

    fn read_rssi(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        let handle = Handle::try_current()?;
        let device = self.device(id)?;
        let tx = self.events.clone();
        let id = id.clone();
        handle.spawn(async move {
            match device.rssi().await {
                Ok(rssi) => {
                    let _ = tx.send(RadioEvent::RssiRead { token, id, rssi });
                }
                Err(e) => warn!("Failed to read RSSI of {}: {}", id, e),
            }
        });
        Ok(())
    }
}
