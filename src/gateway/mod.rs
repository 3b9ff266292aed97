//! Gateway relay
//!
//! This module contains the gateway's receive/forward loop. It listens for
//! raw device datagrams, wraps each one in a Semtech PUSH_DATA header and
//! sends the frame on to the network server.
//!
//! State machine:
//!
//! ```text
//! Init --bind--> Listening --datagram--> Forwarding --sent/failed--> Listening
//!                    |
//!                    +--shutdown--> Stopped
//! ```
//!
//! Receiving and forwarding are done inline, one datagram at a time, so
//! frames reach the server in the order their datagrams arrived.

pub mod forwarder;

use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::GatewayRecord;
use crate::error::SimError;
use crate::protocols::semtech::{FrameBuilder, TokenSource};
use crate::utils::bytes_to_hex;

use forwarder::Forwarder;

/// Relay lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Socket bound, loop not started
    Init,

    /// Waiting for a device datagram or a shutdown request
    Listening,

    /// Encoding and sending one frame to the server
    Forwarding,

    /// Loop exited; terminal
    Stopped,
}

/// Live view of a relay: current state and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    /// Current lifecycle state
    pub state: RelayState,

    /// Datagrams read from the listening socket, including dropped ones
    pub received: u64,

    /// Frames sent to the server
    pub forwarded: u64,

    /// Frames that could not be sent
    pub forward_failures: u64,

    /// Receive calls that failed
    pub receive_errors: u64,

    /// Datagrams dropped for exceeding the maximum datagram size
    pub oversized: u64,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self {
            state: RelayState::Init,
            received: 0,
            forwarded: 0,
            forward_failures: 0,
            receive_errors: 0,
            oversized: 0,
        }
    }
}

/// Control handle for a running relay
///
/// Dropping the handle without calling `shutdown` leaves the relay running
/// until the process exits.
pub struct RelayHandle {
    shutdown_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<RelayStatus>,
}

impl RelayHandle {
    /// Ask the relay to stop once it is back in `Listening`
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn status(&self) -> RelayStatus {
        *self.status_rx.borrow()
    }

    pub fn state(&self) -> RelayState {
        self.status().state
    }
}

/// UDP relay from devices to the network server
pub struct GatewayRelay {
    socket: UdpSocket,
    local_addr: SocketAddr,
    frames: FrameBuilder,
    forwarder: Forwarder,
    max_datagram_size: usize,
    shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<RelayStatus>,
}

impl GatewayRelay {
    /// Bind the listening socket (`Init`). A bind failure is fatal.
    pub async fn bind(record: &GatewayRecord) -> Result<(Self, RelayHandle), SimError> {
        Self::bind_with_frames(record, FrameBuilder::new(record.gateway_id)).await
    }

    /// Bind with a custom token source for frame headers
    pub async fn bind_with_token_source(
        record: &GatewayRecord,
        tokens: Box<dyn TokenSource>,
    ) -> Result<(Self, RelayHandle), SimError> {
        Self::bind_with_frames(record, FrameBuilder::with_token_source(record.gateway_id, tokens)).await
    }

    async fn bind_with_frames(record: &GatewayRecord, frames: FrameBuilder) -> Result<(Self, RelayHandle), SimError> {
        let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, record.listen_port));

        let socket = UdpSocket::bind(listen_addr)
            .await
            .map_err(|e| SimError::setup("binding gateway socket", listen_addr, e))?;

        let local_addr = socket.local_addr()
            .map_err(|e| SimError::setup("reading gateway socket address", listen_addr, e))?;

        info!("Gateway {} listening on {}, forwarding to {}",
            record.gateway_id, local_addr, record.server_endpoint);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(RelayStatus::default());

        let relay = Self {
            socket,
            local_addr,
            frames,
            forwarder: Forwarder::new(record.server_endpoint),
            max_datagram_size: record.max_datagram_size,
            shutdown_rx,
            status_tx,
        };

        Ok((relay, RelayHandle { shutdown_tx, status_rx }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn set_state(&self, state: RelayState) {
        self.status_tx.send_modify(|status| {
            if status.state != state {
                debug!("Relay state {:?} -> {:?}", status.state, state);
                status.state = state;
            }
        });
    }

    /// Run the receive/forward loop until shutdown is requested
    ///
    /// Receive and forward errors are logged and counted; the loop keeps going.
    /// Datagrams longer than the configured maximum are dropped, never cut short.
    pub async fn run(mut self) -> Result<RelayStatus, SimError> {
        // One spare byte tells an oversized datagram apart from one that fits exactly
        let mut buf = vec![0u8; self.max_datagram_size + 1];
        let mut shutdown_live = true;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            self.set_state(RelayState::Listening);

            let received = tokio::select! {
                changed = self.shutdown_rx.changed(), if shutdown_live => {
                    if changed.is_err() {
                        // Handle dropped: nobody can stop us any more
                        shutdown_live = false;
                    }
                    continue;
                }
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, source)) if len > self.max_datagram_size => {
                    self.status_tx.send_modify(|s| {
                        s.received += 1;
                        s.oversized += 1;
                    });
                    warn!("Dropping datagram from {}: longer than {} bytes", source, self.max_datagram_size);
                }
                Ok((len, source)) => {
                    self.status_tx.send_modify(|s| s.received += 1);
                    self.set_state(RelayState::Forwarding);
                    self.forward(&buf[..len], source).await;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.status_tx.send_modify(|s| s.receive_errors += 1);
                    error!("Failed to receive datagram on {}: {}", self.local_addr, e);
                }
            }
        }

        self.set_state(RelayState::Stopped);
        let status = *self.status_tx.borrow();
        info!("Gateway relay stopped: {} received, {} forwarded, {} forward failures, {} receive errors, {} oversized",
            status.received, status.forwarded, status.forward_failures, status.receive_errors, status.oversized);
        Ok(status)
    }

    async fn forward(&mut self, payload: &[u8], source: SocketAddr) {
        info!("Datagram received from {} ({} bytes)", source, payload.len());

        let (header, frame) = self.frames.build(payload);

        match self.forwarder.send(&frame).await {
            Ok(sent) => {
                self.status_tx.send_modify(|s| s.forwarded += 1);
                info!("Frame from {} forwarded to {} ({} bytes, token {})",
                    source, self.forwarder.server(), sent, bytes_to_hex(&header.token));
            }
            Err(e) => {
                self.status_tx.send_modify(|s| s.forward_failures += 1);
                warn!("Frame from {} dropped: {}", source, e);
            }
        }
    }
}
