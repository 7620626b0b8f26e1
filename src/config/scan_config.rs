use crate::core::bluetooth::constants::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_SCAN_TIMEOUT_SECS, SCAN_TICK_INTERVAL_MS,
};
use crate::utils::ensure_directory_exists;
use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

const CONFIG_FILE_NAME: &str = "scan_config.json";

/// Scan window and observer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of one-second ticks a scan stays open
    pub scan_timeout_secs: u32,
    /// Period of the cooperative tick in milliseconds.
    /// Shortening it makes scans expire faster than wall-clock seconds.
    pub tick_interval_ms: u64,
    /// How far a subscriber may lag behind before it starts missing events
    pub event_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            tick_interval_ms: SCAN_TICK_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ScanConfig {
    /// Loads the config from `config_dir`, falling back to defaults when the file is missing.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        if !file_path.exists() {
            warn!("Scan config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Scan config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the config into `config_dir`, creating the directory if needed.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        let config_json = serde_json::to_string_pretty(self).map_err(|e| {
            error!("Failed to serialize scan config to JSON: {}", e);
            e
        })?;

        fs::write(&file_path, config_json).await?;
        info!("Scan config saved to {:?}", file_path);
        Ok(())
    }
}
