//! Semtech UDP packet-forwarder framing
//!
//! This module contains the fixed 13-byte PUSH_DATA header used by the
//! gateway emulator and the codec that prefixes it to relayed payloads.
//!
//! Wire layout:
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 1    | protocol version (2)           |
//! | 1      | 2    | random token                   |
//! | 3      | 2    | identifier (0x00 0x01)         |
//! | 5      | 8    | gateway ID                     |
//! | 13     | n    | payload, copied verbatim       |

mod parser;

use bytes::{BufMut, BytesMut};
use log::debug;
use rand::{rngs::OsRng, RngCore};
use std::fmt;

use crate::utils::{bytes_to_hex, printable};

pub use parser::{parse_frame, SemtechFrame};

/// Protocol version carried in byte 0
pub const PROTOCOL_VERSION: u8 = 2;

/// PUSH_DATA identifier carried in bytes 3-4
pub const PUSH_DATA: [u8; 2] = [0x00, 0x01];

/// Gateway ID width in bytes
pub const GATEWAY_ID_SIZE: usize = 8;

/// Token width in bytes
pub const TOKEN_SIZE: usize = 2;

/// Total header size
pub const HEADER_SIZE: usize = 1 + TOKEN_SIZE + PUSH_DATA.len() + GATEWAY_ID_SIZE;

/// How a configured identifier was fitted into the 8-byte field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFit {
    /// Source was exactly 8 bytes
    Exact,

    /// Source was shorter; this many zero bytes were appended
    Padded(usize),

    /// Source was longer; this many trailing bytes were dropped
    Truncated(usize),
}

/// 8-byte gateway identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GatewayId([u8; GATEWAY_ID_SIZE]);

impl GatewayId {
    pub fn new(bytes: [u8; GATEWAY_ID_SIZE]) -> Self {
        GatewayId(bytes)
    }

    /// Copy at most 8 bytes of `src`, zero-padding short input
    pub fn bounded_copy(src: &[u8]) -> (Self, IdFit) {
        let mut id = [0u8; GATEWAY_ID_SIZE];
        let n = src.len().min(GATEWAY_ID_SIZE);
        id[..n].copy_from_slice(&src[..n]);

        let fit = match src.len() {
            GATEWAY_ID_SIZE => IdFit::Exact,
            len if len < GATEWAY_ID_SIZE => IdFit::Padded(GATEWAY_ID_SIZE - len),
            len => IdFit::Truncated(len - GATEWAY_ID_SIZE),
        };

        (GatewayId(id), fit)
    }

    /// Build an ID from the configured string's UTF-8 bytes
    pub fn from_config_str(id: &str) -> (Self, IdFit) {
        Self::bounded_copy(id.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; GATEWAY_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", printable(&self.0), bytes_to_hex(&self.0))
    }
}

impl fmt::Debug for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GatewayId({})", bytes_to_hex(&self.0))
    }
}

/// Fixed PUSH_DATA header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemtechHeader {
    pub version: u8,
    pub token: [u8; TOKEN_SIZE],
    pub identifier: [u8; 2],
    pub gateway_id: GatewayId,
}

impl SemtechHeader {
    /// Header for an uplink relay message
    pub fn push_data(token: [u8; TOKEN_SIZE], gateway_id: GatewayId) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token,
            identifier: PUSH_DATA,
            gateway_id,
        }
    }
}

/// Encode `header || payload`. The output is always `13 + payload.len()` bytes.
pub fn encode(header: &SemtechHeader, payload: &[u8]) -> Vec<u8> {
    let mut buffer = BytesMut::with_capacity(HEADER_SIZE + payload.len());

    buffer.put_u8(header.version);
    buffer.put_slice(&header.token);
    buffer.put_slice(&header.identifier);
    buffer.put_slice(header.gateway_id.as_bytes());
    buffer.put_slice(payload);

    buffer.to_vec()
}

/// Source of per-frame tokens
#[cfg_attr(test, mockall::automock)]
pub trait TokenSource: Send {
    fn next_token(&mut self) -> [u8; TOKEN_SIZE];
}

/// Tokens drawn from the operating system's CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn next_token(&mut self) -> [u8; TOKEN_SIZE] {
        let mut token = [0u8; TOKEN_SIZE];
        OsRng.fill_bytes(&mut token);
        token
    }
}

/// Builds complete frames for one gateway, drawing a fresh token each time
pub struct FrameBuilder {
    gateway_id: GatewayId,
    tokens: Box<dyn TokenSource>,
}

impl FrameBuilder {
    pub fn new(gateway_id: GatewayId) -> Self {
        Self::with_token_source(gateway_id, Box::new(OsTokenSource))
    }

    pub fn with_token_source(gateway_id: GatewayId, tokens: Box<dyn TokenSource>) -> Self {
        Self { gateway_id, tokens }
    }

    pub fn gateway_id(&self) -> GatewayId {
        self.gateway_id
    }

    /// Wrap a received payload in a fresh PUSH_DATA header
    pub fn build(&mut self, payload: &[u8]) -> (SemtechHeader, Vec<u8>) {
        let header = SemtechHeader::push_data(self.tokens.next_token(), self.gateway_id);
        let frame = encode(&header, payload);
        debug!("Built PUSH_DATA frame: token {}, {} bytes", bytes_to_hex(&header.token), frame.len());
        (header, frame)
    }
}
