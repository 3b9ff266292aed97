//! Frame forwarding toward the network server
//!
//! Every frame goes out on its own short-lived UDP socket; nothing is
//! read back from the server.

use log::debug;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::error::SimError;
use crate::utils::unspecified_for;

/// Sends encoded frames to one fixed server endpoint
#[derive(Debug, Clone, Copy)]
pub struct Forwarder {
    server: SocketAddr,
}

impl Forwarder {
    pub fn new(server: SocketAddr) -> Self {
        Self { server }
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Send one frame. Errors here are per-frame and never fatal.
    pub async fn send(&self, frame: &[u8]) -> Result<usize, SimError> {
        let socket = UdpSocket::bind(unspecified_for(self.server))
            .await
            .map_err(|e| SimError::transient("opening forward socket", self.server, e))?;

        let sent = socket.send_to(frame, self.server)
            .await
            .map_err(|e| SimError::transient("forwarding frame", self.server, e))?;

        debug!("Forwarded {} bytes to {}", sent, self.server);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let forwarder = Forwarder::new(server.local_addr().unwrap());

        assert_eq!(forwarder.send(b"frame").await.unwrap(), 5);

        let mut buf = [0u8; 16];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"frame");
    }

    #[tokio::test]
    async fn test_send_failure_is_recoverable() {
        let forwarder = Forwarder::new("127.0.0.1:0".parse().unwrap());
        let err = forwarder.send(b"frame").await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
