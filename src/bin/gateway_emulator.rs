use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use lora_uplink_sim::config::GatewayConfig;
use lora_uplink_sim::GatewayRelay;
use std::path::PathBuf;
use tokio::signal;

/// Emulated LoRaWAN gateway: relays device datagrams to a network server
#[derive(Parser)]
#[command(name = "gateway_emulator", version)]
struct Cli {
    /// Gateway config file (JSON object)
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = GatewayConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load gateway config {}", cli.config.display()))?;

    // Initialize logging
    env_logger::builder()
        .filter_level(config.get_log_level())
        .parse_default_env()
        .init();
    info!("Gateway configuration loaded from {}", cli.config.display());

    // Validate once the logger is up so gateway_id truncation is reported
    let record = config.validate()
        .with_context(|| format!("Invalid gateway config {}", cli.config.display()))?;

    info!("Starting gateway emulator with ID {}", record.gateway_id);

    // Bind the listening socket; failure here is fatal
    let (relay, handle) = GatewayRelay::bind(&record)
        .await
        .context("Gateway setup failed")?;

    // Start the relay in a separate task
    let relay_task = tokio::spawn(relay.run());

    // Wait for Ctrl+C signal
    info!("Gateway started. Press Ctrl+C to shutdown...");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    handle.shutdown();
    let status = relay_task.await.context("Gateway relay task failed")??;

    info!("Gateway shutdown complete ({} frames forwarded)", status.forwarded);
    Ok(())
}
