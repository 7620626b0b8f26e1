use clap::Parser;
use log::{error, info};

use gatt_browser_lib::commands::{self, Cli, Command};
use gatt_browser_lib::config::AppConfig;
use gatt_browser_lib::core::BluetoothManager;
use gatt_browser_lib::logging::SessionLogger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if SessionLogger::init(log::Level::Info, cli.json_logs).is_err() {
        // only fall back to env_logger when the session logger cannot be installed
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&cli.config_dir).await?;
    if let Some(timeout) = cli.timeout {
        config.scan.scan_timeout_secs = timeout;
    }

    if let Command::InitConfig = cli.command {
        return commands::init_config(&config, &cli.config_dir).await;
    }

    info!("Opening Bluetooth adapter");
    let mut manager = BluetoothManager::new(config).await?;
    commands::execute(&mut manager, cli.command, cli.json_events).await
}
