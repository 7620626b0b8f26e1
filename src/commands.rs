//! Command line interface
//! This module defines all the commands that can be invoked from the shell.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::core::bluetooth::constants::{well_known_service_name, UNKNOWN_RSSI};
use crate::core::bluetooth::{
    BluetoothManager, ConnectionController, PeripheralId, PeripheralRecord, RadioAdapter,
    ServiceEntry,
};

#[derive(Debug, Parser)]
#[command(name = "gatt-browser", version, about = "Scan for BLE peripherals and browse their GATT profile")]
pub struct Cli {
    /// Directory holding scan_config.json and connection_config.json
    #[arg(long, global = true, default_value = ".gatt-browser")]
    pub config_dir: PathBuf,

    /// Scan window in seconds, overrides the config file
    #[arg(long, global = true)]
    pub timeout: Option<u32>,

    /// Print controller, discovery and profile events as JSON lines
    #[arg(long, global = true)]
    pub json_events: bool,

    /// Emit log records as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for connectable peripherals and list them
    Scan,
    /// Scan until the peripheral shows up, connect and print its GATT profile
    Browse {
        /// Peripheral identifier as printed by `scan`
        id: String,
    },
    /// Write the effective configuration to the config directory
    InitConfig,
}

/// Runs one command against the given manager
pub async fn execute<R: RadioAdapter>(
    manager: &mut BluetoothManager<R>,
    command: Command,
    json_events: bool,
) -> Result<()> {
    let printers = if json_events {
        spawn_event_printers(manager.controller())
    } else {
        Vec::new()
    };

    let result = match command {
        Command::Scan => scan_devices(manager).await,
        Command::Browse { id } => browse_device(manager, &PeripheralId::new(id)).await,
        // needs no adapter, handled by `init_config`
        Command::InitConfig => Ok(()),
    };

    for printer in printers {
        printer.abort();
    }
    result
}

/// Writes the effective configuration so it can be edited
pub async fn init_config(config: &AppConfig, config_dir: &Path) -> Result<()> {
    config.save(config_dir).await?;
    println!("Configuration written to {}", config_dir.display());
    Ok(())
}

async fn scan_devices<R: RadioAdapter>(manager: &mut BluetoothManager<R>) -> Result<()> {
    let records = manager.scan().await?;
    print!("{}", format_records(&records));
    Ok(())
}

async fn browse_device<R: RadioAdapter>(
    manager: &mut BluetoothManager<R>,
    id: &PeripheralId,
) -> Result<()> {
    let target = id.clone();
    manager
        .scan_until(|session| session.record(&target).is_some())
        .await?;

    let services = manager.browse(id).await?;
    if let Some(record) = manager.controller().discovery().record(id) {
        println!("{}  {}  RSSI {}", record.display_name, record.id, record.rssi);
    }
    print!("{}", format_profile(&services));

    info!("Leaving {}, disconnecting", id);
    manager.disconnect()
}

fn spawn_event_printers<R: RadioAdapter>(controller: &ConnectionController<R>) -> Vec<JoinHandle<()>> {
    let mut controller_events = controller.subscribe();
    let mut discovery_events = controller.subscribe_discovery();
    let mut profile_events = controller.subscribe_profile();
    vec![
        tokio::spawn(async move {
            while let Ok(event) = controller_events.recv().await {
                print_json(&event);
            }
        }),
        tokio::spawn(async move {
            while let Ok(event) = discovery_events.recv().await {
                print_json(&event);
            }
        }),
        tokio::spawn(async move {
            while let Ok(event) = profile_events.recv().await {
                print_json(&event);
            }
        }),
    ]
}

fn print_json<T: serde::Serialize>(event: &T) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => log::error!("Failed to serialize event: {}", e),
    }
}

/// One line per peripheral: name, identifier, RSSI
pub fn format_records(records: &[PeripheralRecord]) -> String {
    if records.is_empty() {
        return "No connectable peripherals found\n".to_string();
    }
    let mut out = String::new();
    for record in records {
        let rssi = if record.rssi == UNKNOWN_RSSI {
            "n/a".to_string()
        } else {
            format!("{} dBm", record.rssi)
        };
        let _ = writeln!(out, "{:<24} {:<40} {:>8}", record.display_name, record.id, rssi);
    }
    out
}

/// Services as section headers, characteristics as rows with their access flags
pub fn format_profile(services: &[ServiceEntry]) -> String {
    let mut out = String::new();
    for service in services {
        match well_known_service_name(&service.uuid) {
            Some(name) => {
                let _ = writeln!(out, "{} ({})", service.uuid, name);
            }
            None => {
                let _ = writeln!(out, "{}", service.uuid);
            }
        }
        for characteristic in &service.characteristics {
            let flags = characteristic.flags;
            let access = if flags.is_no_access() {
                "no access".to_string()
            } else {
                [
                    (flags.readable, "read"),
                    (flags.writable, "write"),
                    (flags.notifiable, "notify"),
                ]
                .iter()
                .filter(|(set, _)| *set)
                .map(|(_, label)| *label)
                .collect::<Vec<_>>()
                .join(" ")
            };
            let _ = writeln!(out, "    {}  [{}]", characteristic.uuid, access);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{
        PROPERTY_BROADCAST, PROPERTY_NOTIFY, PROPERTY_READ, UUID_BATTERY_SERVICE,
    };
    use crate::core::bluetooth::{CharacteristicEntry, DiscoveredCharacteristic};
    use uuid::Uuid;

    #[test]
    fn profile_lists_flags_and_no_access() {
        let mut battery = ServiceEntry::new(UUID_BATTERY_SERVICE);
        battery.characteristics = vec![
            CharacteristicEntry::new(
                UUID_BATTERY_SERVICE,
                DiscoveredCharacteristic {
                    uuid: Uuid::from_u128(0x2a19),
                    properties: PROPERTY_READ | PROPERTY_NOTIFY,
                },
            ),
            CharacteristicEntry::new(
                UUID_BATTERY_SERVICE,
                DiscoveredCharacteristic {
                    uuid: Uuid::from_u128(0x2a1a),
                    properties: PROPERTY_BROADCAST,
                },
            ),
        ];

        let text = format_profile(&[battery]);
        assert!(text.starts_with(&format!("{} (Battery)", UUID_BATTERY_SERVICE)));
        assert!(text.contains("[read notify]"));
        assert!(text.contains("[no access]"));
    }

    #[test]
    fn missing_rssi_is_not_shown_as_a_reading() {
        let records = vec![
            PeripheralRecord::new(PeripheralId::new("AA:01"), "Sensor".to_string(), -61, true),
            PeripheralRecord::new(PeripheralId::new("AA:02"), "Lamp".to_string(), UNKNOWN_RSSI, true),
        ];
        let text = format_records(&records);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("-61 dBm"));
        assert!(lines[1].ends_with("n/a"));
        assert!(!text.contains(&UNKNOWN_RSSI.to_string()));
    }

    #[test]
    fn empty_scan_says_so() {
        assert_eq!(format_records(&[]), "No connectable peripherals found\n");
    }

    #[test]
    fn cli_parses_browse() {
        let cli = Cli::try_parse_from(["gatt-browser", "--timeout", "3", "browse", "AA:BB"]).unwrap();
        assert_eq!(cli.timeout, Some(3));
        assert!(matches!(cli.command, Command::Browse { ref id } if id == "AA:BB"));
    }
}
