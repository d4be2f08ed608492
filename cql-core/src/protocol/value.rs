//! Encoding and decoding of the CQL value types found in system tables.
//!
//! Only the types the control channel reads are covered: `text`, `boolean`,
//! `int` and `inet`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, Bytes};

use crate::error::{CqlError, Result};

/// Encodes a `text` value.
pub fn text(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

/// Encodes a `boolean` value.
pub fn boolean(value: bool) -> Bytes {
    Bytes::from_static(if value { &[1] } else { &[0] })
}

/// Encodes an `int` value.
pub fn int(value: i32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// Encodes an `inet` value.
pub fn inet(value: IpAddr) -> Bytes {
    match value {
        IpAddr::V4(v4) => Bytes::copy_from_slice(&v4.octets()),
        IpAddr::V6(v6) => Bytes::copy_from_slice(&v6.octets()),
    }
}

/// Decodes a `text` value.
pub fn decode_text(raw: &Bytes) -> Result<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| CqlError::Protocol(format!("invalid UTF-8 in text value: {}", e)))
}

/// Decodes a `boolean` value.
pub fn decode_boolean(raw: &Bytes) -> Result<bool> {
    match raw.as_ref() {
        [b] => Ok(*b != 0),
        other => Err(CqlError::Protocol(format!(
            "boolean value must be 1 byte, got {}",
            other.len()
        ))),
    }
}

/// Decodes an `int` value.
pub fn decode_int(raw: &Bytes) -> Result<i32> {
    if raw.len() != 4 {
        return Err(CqlError::Protocol(format!(
            "int value must be 4 bytes, got {}",
            raw.len()
        )));
    }
    Ok(raw.clone().get_i32())
}

/// Decodes an `inet` value (4 bytes for IPv4, 16 bytes for IPv6).
pub fn decode_inet(raw: &Bytes) -> Result<IpAddr> {
    match raw.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(raw);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        n => Err(CqlError::Protocol(format!(
            "inet value must be 4 or 16 bytes, got {}",
            n
        ))),
    }
}
