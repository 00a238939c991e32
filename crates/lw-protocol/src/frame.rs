//! Envelope header encoding/decoding
//!
//! The envelope format uses a 5-byte header:
//! - kind: 1 byte (u8)
//! - payload_length: 4 bytes (u32, big-endian)
//!
//! The kind byte is deliberately not validated here: a receiver must be
//! able to pull a complete envelope with an unknown kind off the wire
//! and log-and-ignore it, rather than tearing down the connection.

use bytes::{Buf, BufMut, BytesMut};

/// Size of the envelope header in bytes
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 0x0010_0000;

/// Envelope header carrying the message kind and payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Raw message kind byte
    pub kind: u8,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl EnvelopeHeader {
    /// Create a new envelope header
    pub fn new(kind: u8, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.kind);
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }

        let kind = src.get_u8();
        let payload_length = src.get_u32();

        Some(Self {
            kind,
            payload_length,
        })
    }
}
