//! Message types for the lanwatch control protocol
//!
//! Messages are exchanged between the admin and worker roles over a
//! persistent TCP connection, one envelope per message. Payloads are
//! serialized with bincode and decoded only after the kind is known.
//!
//! # Message Flow
//!
//! 1. Admin connects; worker immediately sends `SystemInfo`
//! 2. Admin sends `AdminInfo` to identify itself
//! 3. Worker streams `Metrics` at a fixed cadence while connected
//! 4. `Ping`/`Pong` for liveness, `Disconnect` for explicit teardown
//! 5. A worker that already has an active admin replies `Busy` to any
//!    further control connection and closes it

use serde::{Deserialize, Serialize};

use crate::codec::Envelope;
use crate::error::ProtocolError;

/// Message kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// One-time system snapshot, worker -> admin, first message on the wire
    SystemInfo = 0x01,
    /// Periodic live metrics, worker -> admin
    Metrics = 0x02,
    /// Admin identification, admin -> worker, right after connecting
    AdminInfo = 0x03,
    /// Remote command (reserved, currently a no-op on the worker)
    Command = 0x04,
    /// Liveness probe
    Ping = 0x05,
    /// Liveness reply
    Pong = 0x06,
    /// Explicit disconnect intent from either side
    Disconnect = 0x07,
    /// Worker already serves an admin; connection is being refused
    Busy = 0x08,
}

impl MessageKind {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::SystemInfo),
            0x02 => Some(Self::Metrics),
            0x03 => Some(Self::AdminInfo),
            0x04 => Some(Self::Command),
            0x05 => Some(Self::Ping),
            0x06 => Some(Self::Pong),
            0x07 => Some(Self::Disconnect),
            0x08 => Some(Self::Busy),
            _ => None,
        }
    }
}

/// System snapshot sent exactly once per connection, immediately after accept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfoPayload {
    /// Worker hostname
    pub hostname: String,
    /// Operating system name (e.g. "Linux", "Windows")
    pub os: String,
    /// CPU architecture (e.g. "x86_64", "aarch64")
    pub architecture: String,
    /// Preferred outbound IPv4 address on the LAN
    pub ip_address: String,
    /// CPU usage percentage at snapshot time
    pub cpu_usage: f64,
    /// RAM usage percentage at snapshot time
    pub ram_usage: f64,
    /// Total RAM in bytes
    pub ram_total: u64,
    /// Used RAM in bytes
    pub ram_used: u64,
    /// GPU model name, "N/A" when unknown
    pub gpu_name: String,
    /// GPU usage percentage at snapshot time
    pub gpu_usage: f64,
    /// Informational link-speed string, not a measurement the core makes
    pub internet_speed: String,
    /// System uptime in seconds
    pub uptime_secs: u64,
}

/// Live metrics streamed at a fixed interval while the connection is open
///
/// Carries no identity: the connection itself identifies the worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    /// CPU usage percentage
    pub cpu_usage: f64,
    /// RAM usage percentage
    pub ram_usage: f64,
    /// GPU usage percentage
    pub gpu_usage: f64,
}

/// Admin identification sent once right after connecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminInfoPayload {
    /// Hostname of the admin machine
    pub hostname: String,
}

/// Remote command payload (reserved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Command string
    pub command: String,
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// One-time system snapshot
    SystemInfo(SystemInfoPayload),
    /// Periodic metrics sample
    Metrics(MetricsPayload),
    /// Admin identification
    AdminInfo(AdminInfoPayload),
    /// Remote command (reserved)
    Command(CommandPayload),
    /// Liveness probe
    Ping,
    /// Liveness reply
    Pong,
    /// Explicit disconnect intent
    Disconnect,
    /// Worker refused a second concurrent admin connection
    Busy,
}

impl Message {
    /// Get the message kind for this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::SystemInfo(_) => MessageKind::SystemInfo,
            Message::Metrics(_) => MessageKind::Metrics,
            Message::AdminInfo(_) => MessageKind::AdminInfo,
            Message::Command(_) => MessageKind::Command,
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
            Message::Disconnect => MessageKind::Disconnect,
            Message::Busy => MessageKind::Busy,
        }
    }

    /// Serialize into a wire envelope
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let payload = match self {
            Message::SystemInfo(p) => bincode::serialize(p)?,
            Message::Metrics(p) => bincode::serialize(p)?,
            Message::AdminInfo(p) => bincode::serialize(p)?,
            Message::Command(p) => bincode::serialize(p)?,
            Message::Ping | Message::Pong | Message::Disconnect | Message::Busy => Vec::new(),
        };

        Ok(Envelope::new(self.kind().as_u8(), payload.into()))
    }

    /// Decode a typed message from a received envelope
    ///
    /// Fails on an unknown kind byte or a malformed payload. Both are
    /// per-envelope failures; the receive loop logs them and keeps the
    /// connection open.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_u8(envelope.kind)
            .ok_or(ProtocolError::UnknownMessageKind(envelope.kind))?;

        let message = match kind {
            MessageKind::SystemInfo => {
                Message::SystemInfo(bincode::deserialize(&envelope.payload)?)
            }
            MessageKind::Metrics => Message::Metrics(bincode::deserialize(&envelope.payload)?),
            MessageKind::AdminInfo => Message::AdminInfo(bincode::deserialize(&envelope.payload)?),
            MessageKind::Command => Message::Command(bincode::deserialize(&envelope.payload)?),
            MessageKind::Ping => Message::Ping,
            MessageKind::Pong => Message::Pong,
            MessageKind::Disconnect => Message::Disconnect,
            MessageKind::Busy => Message::Busy,
        };

        Ok(message)
    }
}
