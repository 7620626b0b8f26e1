pub mod connection_config;
pub mod scan_config;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::connection_config::ConnectionConfig;
use crate::config::scan_config::ScanConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub connection: ConnectionConfig,
}

impl AppConfig {
    /// Loads every sub-config from `config_dir`
    pub async fn load(config_dir: &Path) -> Result<Self> {
        Ok(AppConfig {
            scan: ScanConfig::load_config(config_dir).await?,
            connection: ConnectionConfig::load_config(config_dir).await?,
        })
    }

    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        self.scan.save_config(config_dir).await?;
        self.connection.save_config(config_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gatt-browser-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn missing_files_give_defaults() {
        let dir = scratch_dir("missing");
        let config = AppConfig::load(&dir).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.scan.scan_timeout_secs, 5);
    }

    #[tokio::test]
    async fn saved_config_loads_back() {
        let dir = scratch_dir("saved").join("nested");
        let mut config = AppConfig::default();
        config.scan.scan_timeout_secs = 12;
        config.connection.rssi_poll_interval_secs = None;

        config.save(&dir).await.unwrap();
        let loaded = AppConfig::load(&dir).await.unwrap();
        assert_eq!(loaded, config);

        let _ = tokio::fs::remove_dir_all(scratch_dir("saved")).await;
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = scratch_dir("partial");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("scan_config.json"), r#"{ "scan_timeout_secs": 30 }"#)
            .await
            .unwrap();

        let scan = ScanConfig::load_config(&dir).await.unwrap();
        assert_eq!(scan.scan_timeout_secs, 30);
        assert_eq!(scan.event_capacity, ScanConfig::default().event_capacity);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
