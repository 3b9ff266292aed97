use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use lora_uplink_sim::protocols::semtech::parse_frame;
use lora_uplink_sim::utils::{bytes_to_hex, hex_dump};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::signal;

/// Stand-in network server: decodes and logs PUSH_DATA frames
#[derive(Parser)]
#[command(name = "netserver_sink", version)]
struct Cli {
    /// Address to listen on, e.g. 0.0.0.0:1800
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let socket = UdpSocket::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    info!("Network server sink listening on {}", socket.local_addr()?);

    let mut buf = vec![0u8; 65535];
    let mut frames = 0u64;

    loop {
        let (len, source) = tokio::select! {
            _ = signal::ctrl_c() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(r) => r,
                Err(e) => {
                    warn!("Receive failed: {}", e);
                    continue;
                }
            },
        };

        match parse_frame(&buf[..len]) {
            Ok(frame) => {
                frames += 1;
                info!("Frame #{} from {}: gateway {}, token {}, {} payload bytes",
                    frames, source, frame.header.gateway_id,
                    bytes_to_hex(&frame.header.token), frame.payload.len());
                info!("Payload: {}", hex_dump(&frame.payload));
            }
            Err(e) => warn!("Discarding {} bytes from {}: {:#}", len, source, e),
        }
    }

    info!("Sink stopped after {} frames", frames);
    Ok(())
}
