//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
///
/// Two classes matter to receive loops: errors surfaced by the codec
/// (`PayloadTooLarge`, `Io`) indicate a corrupt stream and are fatal to
/// the connection, while errors from typed payload decoding
/// (`UnknownMessageKind`, `Payload`) apply to a single envelope and the
/// loop continues.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown message kind byte
    #[error("Unknown message kind: {0:#04x}")]
    UnknownMessageKind(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload serialization error
    #[error("Payload error: {0}")]
    Payload(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error poisons the whole stream
    ///
    /// A malformed payload of a known-length envelope leaves the stream
    /// positioned at the next envelope; an oversize length or I/O error
    /// does not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::PayloadTooLarge { .. } | ProtocolError::Io(_)
        )
    }
}
