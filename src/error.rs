//! Error taxonomy shared by the device and gateway programs
//!
//! Every failure carries a severity so callers can tell "stop now" (setup
//! problems) from "log it and keep going" (per-datagram problems).

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;
use crate::security::CipherError;

/// Whether an error must stop the program or only the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Setup-phase failure; the program cannot continue
    Fatal,

    /// Steady-state failure; log, isolate and continue
    Recoverable,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network setup failed while {operation} ({endpoint}): {source}")]
    NetworkSetup {
        operation: &'static str,
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Network error while {operation} ({endpoint}): {source}")]
    NetworkTransient {
        operation: &'static str,
        endpoint: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
}

impl SimError {
    pub fn setup(operation: &'static str, endpoint: SocketAddr, source: io::Error) -> Self {
        SimError::NetworkSetup { operation, endpoint, source }
    }

    pub fn transient(operation: &'static str, endpoint: SocketAddr, source: io::Error) -> Self {
        SimError::NetworkTransient { operation, endpoint, source }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SimError::Config(_) | SimError::NetworkSetup { .. } => Severity::Fatal,
            SimError::NetworkTransient { .. } | SimError::Cipher(_) => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
