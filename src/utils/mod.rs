//! Utility functions for the uplink simulator
//!
//! This module provides hex helpers and small formatting utilities
//! shared by the device, gateway and sink programs.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Convert bytes to a lowercase hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            acc.push_str(&format!("{:02x}", b));
            acc
        })
}

/// Parse a hexadecimal string to bytes
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err(format!("odd hex string length {}", hex.len()));
    }
    if !hex.is_ascii() {
        return Err("hex string contains non-ASCII characters".to_string());
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);

    for i in (0..hex.len()).step_by(2) {
        let byte_str = &hex[i..i+2];
        let byte = u8::from_str_radix(byte_str, 16)
            .map_err(|_| format!("invalid hex digits '{}' at offset {}", byte_str, i))?;
        bytes.push(byte);
    }

    Ok(bytes)
}

/// Parse a hexadecimal string that must decode to exactly `N` bytes
pub fn hex_to_array<const N: usize>(hex: &str) -> Result<[u8; N], String> {
    let bytes = hex_to_bytes(hex)?;
    let len = bytes.len();
    bytes.try_into()
        .map_err(|_| format!("expected {} bytes ({} hex chars), got {} bytes", N, N * 2, len))
}

/// Render bytes as space-separated hex pairs, the way payload dumps are logged
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render bytes as text, replacing anything non-printable with '.'
pub fn printable(bytes: &[u8]) -> String {
    bytes.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Ephemeral local address in the same family as `remote`
pub fn unspecified_for(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}
