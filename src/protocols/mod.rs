//! Protocol implementation modules for the uplink simulator
//!
//! Device datagrams carry no framing of their own; the only wire format
//! is the gateway-to-server Semtech framing.

pub mod semtech;
