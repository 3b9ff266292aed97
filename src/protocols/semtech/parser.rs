//! Semtech PUSH_DATA frame parser
//!
//! This module contains functions for decoding frames produced by the
//! gateway, as seen by a network server.

use anyhow::{anyhow, bail, Result};
use log::debug;
use nom::{
    bytes::complete::take,
    combinator::map,
    number::complete::be_u8,
    sequence::tuple,
    IResult,
};

use super::{GatewayId, SemtechHeader, GATEWAY_ID_SIZE, HEADER_SIZE, PROTOCOL_VERSION, PUSH_DATA, TOKEN_SIZE};

/// A decoded frame: header plus the opaque payload that followed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemtechFrame {
    pub header: SemtechHeader,
    pub payload: Vec<u8>,
}

fn fixed<const N: usize>(input: &[u8]) -> IResult<&[u8], [u8; N]> {
    map(take(N), |bytes: &[u8]| {
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        out
    })(input)
}

fn header(input: &[u8]) -> IResult<&[u8], SemtechHeader> {
    map(
        tuple((be_u8, fixed::<TOKEN_SIZE>, fixed::<2>, fixed::<GATEWAY_ID_SIZE>)),
        |(version, token, identifier, gateway_id)| SemtechHeader {
            version,
            token,
            identifier,
            gateway_id: GatewayId::new(gateway_id),
        },
    )(input)
}

/// Parse a PUSH_DATA frame from raw bytes
pub fn parse_frame(data: &[u8]) -> Result<SemtechFrame> {
    if data.len() < HEADER_SIZE {
        bail!("Frame too short: {} bytes, header alone is {} bytes", data.len(), HEADER_SIZE);
    }

    let (payload, header) = header(data)
        .map_err(|e| anyhow!("Malformed Semtech header: {:?}", e))?;

    if header.version != PROTOCOL_VERSION {
        bail!("Unsupported protocol version {} (expected {})", header.version, PROTOCOL_VERSION);
    }

    if header.identifier != PUSH_DATA {
        bail!("Unexpected identifier {:02x}{:02x} (expected PUSH_DATA)",
            header.identifier[0], header.identifier[1]);
    }

    debug!("Parsed PUSH_DATA frame from gateway {}: {} payload bytes", header.gateway_id, payload.len());

    Ok(SemtechFrame {
        header,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::semtech::encode;

    #[test]
    fn test_parse_encoded_frame() {
        let (gateway_id, _) = GatewayId::from_config_str("ABCDEFGH");
        let header = SemtechHeader::push_data([0x12, 0x34], gateway_id);
        let data = encode(&header, &[0xDE, 0xAD, 0xBE, 0xEF]);

        let frame = parse_frame(&data).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_parse_header_only() {
        let (gateway_id, _) = GatewayId::from_config_str("GW");
        let data = encode(&SemtechHeader::push_data([0, 0], gateway_id), &[]);

        let frame = parse_frame(&data).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.header.gateway_id.as_bytes(), b"GW\0\0\0\0\0\0");
    }

    #[test]
    fn test_reject_short_frame() {
        let err = parse_frame(&[2, 0, 0, 0, 1]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_reject_wrong_version_and_identifier() {
        let (gateway_id, _) = GatewayId::from_config_str("ABCDEFGH");
        let mut data = encode(&SemtechHeader::push_data([1, 1], gateway_id), b"x");

        data[0] = 1;
        assert!(parse_frame(&data).unwrap_err().to_string().contains("version"));

        data[0] = PROTOCOL_VERSION;
        data[4] = 0x02;
        assert!(parse_frame(&data).unwrap_err().to_string().contains("identifier"));
    }
}
