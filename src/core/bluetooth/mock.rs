//! In-memory radio for tests and demos
//! Records every command it receives and, when scripted, answers them with
//! the events a real radio would eventually deliver.

use anyhow::{anyhow, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::core::bluetooth::radio::{RadioAdapter, RadioEvent, RequestToken};
use crate::core::bluetooth::types::{Advertisement, DiscoveredCharacteristic, PeripheralId};

/// A command as received by the radio
#[derive(Debug, Clone, PartialEq)]
pub enum RadioCommand {
    StartScan(RequestToken),
    StopScan,
    Connect(RequestToken, PeripheralId),
    Disconnect(RequestToken, PeripheralId),
    DiscoverServices(RequestToken, PeripheralId),
    DiscoverCharacteristics(RequestToken, PeripheralId, Uuid),
    ReadRssi(RequestToken, PeripheralId),
}

/// A peripheral the scripted radio pretends to see
#[derive(Debug, Clone, Default)]
pub struct MockPeripheral {
    pub id: PeripheralId,
    pub device_name: Option<String>,
    pub advertisement: Advertisement,
    pub rssi: i16,
    pub services: Vec<(Uuid, Vec<DiscoveredCharacteristic>)>,
    /// When set, connecting fails with this reason
    pub connect_error: Option<String>,
}

impl MockPeripheral {
    pub fn new(id: &str, local_name: &str) -> Self {
        Self {
            id: PeripheralId::new(id),
            device_name: None,
            advertisement: Advertisement {
                local_name: Some(local_name.to_string()),
                is_connectable: true,
                ..Default::default()
            },
            rssi: -60,
            ..Default::default()
        }
    }

    pub fn with_service(mut self, service: Uuid, characteristics: Vec<DiscoveredCharacteristic>) -> Self {
        self.services.push((service, characteristics));
        self
    }
}

#[derive(Default)]
pub struct MockRadio {
    pub commands: Vec<RadioCommand>,
    /// Makes every dispatch fail, as if the platform stack refused it
    pub refuse_commands: bool,
    pub peripherals: Vec<MockPeripheral>,
    events: Option<UnboundedSender<RadioEvent>>,
}

impl MockRadio {
    /// A radio that only records commands
    pub fn new() -> Self {
        Self::default()
    }

    /// A radio that answers commands for the given peripherals
    pub fn scripted(peripherals: Vec<MockPeripheral>) -> (Self, UnboundedReceiver<RadioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let radio = Self {
            peripherals,
            events: Some(tx),
            ..Default::default()
        };
        (radio, rx)
    }

    pub fn last_command(&self) -> Option<&RadioCommand> {
        self.commands.last()
    }

    fn record(&mut self, command: RadioCommand) -> Result<()> {
        if self.refuse_commands {
            return Err(anyhow!("radio refused {:?}", command));
        }
        self.commands.push(command);
        Ok(())
    }

    fn reply(&self, event: RadioEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn peripheral(&self, id: &PeripheralId) -> Option<&MockPeripheral> {
        self.peripherals.iter().find(|p| &p.id == id)
    }
}

impl RadioAdapter for MockRadio {
    fn start_scan(&mut self, token: RequestToken) -> Result<()> {
        self.record(RadioCommand::StartScan(token))?;
        for peripheral in &self.peripherals {
            self.reply(RadioEvent::Discovered {
                token,
                id: peripheral.id.clone(),
                device_name: peripheral.device_name.clone(),
                advertisement: peripheral.advertisement.clone(),
                rssi: peripheral.rssi,
            });
        }
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.commands.push(RadioCommand::StopScan);
    }

    fn connect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        self.record(RadioCommand::Connect(token, id.clone()))?;
        let Some(peripheral) = self.peripheral(id) else {
            return Ok(());
        };
        let event = match &peripheral.connect_error {
            Some(reason) => RadioEvent::ConnectFailed {
                token,
                id: id.clone(),
                reason: reason.clone(),
            },
            None => RadioEvent::Connected {
                token,
                id: id.clone(),
            },
        };
        self.reply(event);
        Ok(())
    }

    fn disconnect(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        self.record(RadioCommand::Disconnect(token, id.clone()))?;
        self.reply(RadioEvent::Disconnected {
            token,
            id: id.clone(),
            reason: None,
        });
        Ok(())
    }

    fn discover_services(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        self.record(RadioCommand::DiscoverServices(token, id.clone()))?;
        if let Some(peripheral) = self.peripheral(id) {
            let services = peripheral.services.iter().map(|(uuid, _)| *uuid).collect();
            self.reply(RadioEvent::ServicesDiscovered {
                token,
                id: id.clone(),
                services,
            });
        }
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        token: RequestToken,
        id: &PeripheralId,
        service: Uuid,
    ) -> Result<()> {
        self.record(RadioCommand::DiscoverCharacteristics(token, id.clone(), service))?;
        let characteristics = self
            .peripheral(id)
            .and_then(|p| p.services.iter().find(|(uuid, _)| *uuid == service))
            .map(|(_, characteristics)| characteristics.clone());
        if let Some(characteristics) = characteristics {
            self.reply(RadioEvent::CharacteristicsDiscovered {
                token,
                id: id.clone(),
                service,
                characteristics,
            });
        }
        Ok(())
    }

    fn read_rssi(&mut self, token: RequestToken, id: &PeripheralId) -> Result<()> {
        self.record(RadioCommand::ReadRssi(token, id.clone()))?;
        if let Some(peripheral) = self.peripheral(id) {
            self.reply(RadioEvent::RssiRead {
                token,
                id: id.clone(),
                rssi: peripheral.rssi.saturating_add(5),
            });
        }
        Ok(())
    }
}
