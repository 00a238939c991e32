//! Tokio codec for envelope framing

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{EnvelopeHeader, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// A complete wire envelope: kind byte plus opaque payload
///
/// The payload stays opaque until the receiver matches the kind; see
/// [`Message::from_envelope`].
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Raw kind byte (may be unknown to this receiver)
    pub kind: u8,
    /// Opaque payload bytes
    pub payload: Bytes,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(kind: u8, payload: Bytes) -> Self {
        Self { kind, payload }
    }
}

/// Codec for encoding/decoding envelopes on a byte stream
#[derive(Debug, Default)]
pub struct EnvelopeCodec {
    /// Header decoded while waiting for the rest of the payload
    pending_header: Option<EnvelopeHeader>,
}

impl EnvelopeCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Try to decode a header if we don't have one
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match EnvelopeHeader::decode(src) {
                Some(h) => h,
                None => return Ok(None), // Need more data
            },
        };

        // An absurd length means the stream is corrupt; fatal
        let payload_len = header.payload_length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        if src.len() < payload_len {
            // Save header and wait for more data
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();

        Ok(Some(Envelope::new(header.kind, payload)))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = envelope.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = EnvelopeHeader::new(envelope.kind, payload_len as u32);
        header.encode(dst);
        dst.extend_from_slice(&envelope.payload);

        Ok(())
    }
}

/// Convenience: a framed transport can send typed messages directly
impl Encoder<Message> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let envelope = message.to_envelope()?;
        self.encode(envelope, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;
    use crate::message::{MessageKind, MetricsPayload};

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = EnvelopeCodec::new();

        let message = Message::Metrics(MetricsPayload {
            cpu_usage: 10.0,
            ram_usage: 20.0,
            gpu_usage: 30.0,
        });

        let mut buf = BytesMut::new();
        codec.encode(message.clone(), &mut buf).unwrap();

        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, MessageKind::Metrics.as_u8());

        let decoded = Message::from_envelope(&envelope).unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = EnvelopeCodec::new();

        let message = Message::AdminInfo(crate::message::AdminInfoPayload {
            hostname: "admin-box".to_string(),
        });

        let mut full_buf = BytesMut::new();
        codec.encode(message.clone(), &mut full_buf).unwrap();

        // Header split mid-way: no envelope yet
        let mut partial = full_buf.split_to(HEADER_SIZE - 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Header complete but payload missing: still no envelope
        let remaining = full_buf.split();
        partial.extend_from_slice(&remaining[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Rest arrives
        partial.extend_from_slice(&remaining[3..]);
        let envelope = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(Message::from_envelope(&envelope).unwrap(), message);
    }

    #[test]
    fn test_unknown_kind_yields_envelope() {
        let mut codec = EnvelopeCodec::new();

        let mut buf = BytesMut::new();
        codec
            .encode(Envelope::new(0x7F, Bytes::from_static(b"????")), &mut buf)
            .unwrap();

        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, 0x7F);
        assert!(Message::from_envelope(&envelope).is_err());
    }

    #[test]
    fn test_oversize_length_is_fatal() {
        let mut buf = BytesMut::new();
        EnvelopeHeader::new(MessageKind::Ping.as_u8(), (MAX_PAYLOAD_SIZE + 1) as u32)
            .encode(&mut buf);

        let mut codec = EnvelopeCodec::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_back_to_back_envelopes() {
        let mut codec = EnvelopeCodec::new();

        let mut buf = BytesMut::new();
        codec.encode(Message::Ping, &mut buf).unwrap();
        codec.encode(Message::Pong, &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Message::from_envelope(&first).unwrap(), Message::Ping);
        assert_eq!(Message::from_envelope(&second).unwrap(), Message::Pong);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
