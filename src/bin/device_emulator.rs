use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use lora_uplink_sim::utils::bytes_to_hex;
use lora_uplink_sim::DeviceUplinkSender;
use std::path::PathBuf;
use std::process::ExitCode;

/// Emulated LoRaWAN end-devices: send one encrypted uplink per device
#[derive(Parser)]
#[command(name = "device_emulator", version)]
struct Cli {
    /// Device config file (JSON array of devices)
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // Every device must be valid before anything is sent
    let report = DeviceUplinkSender::new()
        .send_from_config(&cli.config)
        .await
        .with_context(|| format!("Failed to load device config {}", cli.config.display()))?;

    if report.is_success() {
        info!("All {} uplinks sent", report.succeeded());
        return Ok(ExitCode::SUCCESS);
    }

    for failure in report.failures() {
        if let Err(e) = &failure.result {
            error!("Device {} -> {}: {}", bytes_to_hex(&failure.dev_eui), failure.gateway_endpoint, e);
        }
    }
    error!("{} of {} uplinks failed", report.failed(), report.outcomes.len());
    Ok(ExitCode::FAILURE)
}
