//! LoRaWAN uplink simulator
//!
//! This library provides emulated end-devices that encrypt a payload and
//! send it over UDP, and an emulated gateway that wraps each received
//! datagram in a Semtech PUSH_DATA header and relays it to a network server.

pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod protocols;
pub mod security;
pub mod utils;

pub use config::{DeviceRecord, GatewayRecord};
pub use device::DeviceUplinkSender;
pub use error::{Severity, SimError};
pub use gateway::{GatewayRelay, RelayHandle};
