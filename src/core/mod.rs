//! Core functionality of the GATT browser
//! This module contains everything needed to find, connect to and browse a peripheral.

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, ConnectionController};
