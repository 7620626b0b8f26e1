//! GATT browser library
//! Session core for scanning BLE peripherals, connecting to one and
//! browsing its GATT profile, plus the command line glue around it.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;

pub use crate::core::{BluetoothManager, ConnectionController};
pub use crate::error::{RejectCause, SessionError};
