//! Core error types for lanwatch

use std::path::PathBuf;
use thiserror::Error;

use lw_protocol::ProtocolError;

/// Top-level error type for the lanwatch ecosystem
#[derive(Error, Debug)]
pub enum LwError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport errors for outbound control connections
///
/// The variants are deliberately distinguishable so the presentation
/// layer can tell an unreachable host from a refused port from a
/// timeout; none of them are retried by the core.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Dial exceeded its deadline
    #[error("Connection to {addr} timed out - check that port {port} is open on the worker firewall")]
    Timeout { addr: String, port: u16 },

    /// Peer actively refused the connection
    #[error("Connection to {addr} refused - make sure the worker application is running")]
    Refused { addr: String },

    /// No route, unreachable network, or any other dial failure
    #[error("Cannot reach {addr}: {message}")]
    Unreachable { addr: String, message: String },

    /// Worker already serves an admin and rejected this connection
    #[error("Worker at {addr} is busy with another admin")]
    WorkerBusy { addr: String },

    /// Peer is not connected
    #[error("Not connected to {addr}")]
    NotConnected { addr: String },

    /// I/O on an established connection failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failed on an established connection
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectError {
    /// Classify a dial failure on `addr` into the transport taxonomy
    pub fn from_dial_error(addr: &str, port: u16, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ConnectError::Timeout {
                addr: addr.to_string(),
                port,
            },
            std::io::ErrorKind::ConnectionRefused => ConnectError::Refused {
                addr: addr.to_string(),
            },
            _ => ConnectError::Unreachable {
                addr: addr.to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
