//! lw-protocol: Wire protocol for lanwatch control connections
//!
//! This crate defines the length-delimited, type-tagged envelope format
//! carried over the persistent TCP connection between the admin and
//! worker roles, and the typed payloads inside it.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Envelope, EnvelopeCodec};
pub use error::ProtocolError;
pub use frame::{EnvelopeHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{
    AdminInfoPayload, CommandPayload, Message, MessageKind, MetricsPayload, SystemInfoPayload,
};
