//! Emulated end-device uplinks
//!
//! Each device encrypts a demonstration payload with its AppKey and sends
//! the result as one UDP datagram to its gateway. Devices are processed
//! strictly in order; a failure is recorded against the device and the
//! remaining devices still run.

use log::{debug, error, info};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::UdpSocket;

use crate::config::{load_devices, DeviceRecord};
use crate::error::SimError;
use crate::security::PayloadCipher;
use crate::utils::{bytes_to_hex, hex_dump, unspecified_for};

/// Payload every emulated device sends
pub const DEMO_PAYLOAD: &[u8] = b"HelloLoRaWAN";

/// Result of one device's uplink attempt
#[derive(Debug)]
pub struct UplinkOutcome {
    pub dev_eui: [u8; 8],
    pub gateway_endpoint: SocketAddr,
    /// Bytes sent on success
    pub result: Result<usize, SimError>,
}

/// Aggregate of all uplink attempts in one run
#[derive(Debug, Default)]
pub struct UplinkReport {
    pub outcomes: Vec<UplinkOutcome>,
}

impl UplinkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &UplinkOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Sends one encrypted uplink per device
pub struct DeviceUplinkSender {
    payload: Vec<u8>,
}

impl Default for DeviceUplinkSender {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceUplinkSender {
    pub fn new() -> Self {
        Self::with_payload(DEMO_PAYLOAD)
    }

    pub fn with_payload(payload: &[u8]) -> Self {
        Self { payload: payload.to_vec() }
    }

    /// Encrypt the payload and send it to the device's gateway
    ///
    /// Fire-and-forget: nothing is read back and nothing is retried. The
    /// socket is bound to an ephemeral port and closed on return.
    pub async fn send_uplink(&self, device: &DeviceRecord) -> Result<usize, SimError> {
        let cipher = PayloadCipher::new(device.iv_mode);
        let datagram = cipher.encrypt(&device.app_key, &self.payload)?;
        debug!("Encrypted payload ({}, {} bytes): {}", device.iv_mode, datagram.len(), hex_dump(&datagram));

        let endpoint = device.gateway_endpoint;
        let socket = UdpSocket::bind(unspecified_for(endpoint))
            .await
            .map_err(|e| SimError::setup("binding uplink socket", endpoint, e))?;

        let sent = socket.send_to(&datagram, endpoint)
            .await
            .map_err(|e| SimError::transient("sending uplink", endpoint, e))?;

        info!("Uplink from {} sent to gateway {} ({} bytes)", bytes_to_hex(&device.dev_eui), endpoint, sent);
        Ok(sent)
    }

    /// Run every device in order and collect the outcomes
    pub async fn send_all(&self, devices: &[DeviceRecord]) -> UplinkReport {
        let mut report = UplinkReport::default();

        for (i, device) in devices.iter().enumerate() {
            info!("Simulating device {} of {}: devEUI {} appEUI {} mode {}",
                i + 1, devices.len(),
                bytes_to_hex(&device.dev_eui),
                bytes_to_hex(&device.app_eui),
                device.mode);

            let result = self.send_uplink(device).await;
            if let Err(e) = &result {
                error!("Device {} failed: {}", bytes_to_hex(&device.dev_eui), e);
            }

            report.outcomes.push(UplinkOutcome {
                dev_eui: device.dev_eui,
                gateway_endpoint: device.gateway_endpoint,
                result,
            });
        }

        info!("Uplink run complete: {} sent, {} failed", report.succeeded(), report.failed());
        report
    }

    /// Load and validate every device in `path`, then run them all
    ///
    /// A config error is returned before any socket is opened.
    pub async fn send_from_config<P: AsRef<Path>>(&self, path: P) -> Result<UplinkReport, SimError> {
        let devices = load_devices(path)?;
        Ok(self.send_all(&devices).await)
    }
}
