//! lw-core: Shared types, configuration and interfaces for lanwatch
//!
//! This crate provides the device model, event-listener traits,
//! configuration structures and error taxonomy used by the worker and
//! admin components.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod net;
pub mod types;

pub use config::{AdminConfig, SshCredentials, WorkerConfig};
pub use error::{ConfigError, ConnectError, LwError};
pub use events::{AdminEvents, WorkerEvents};
pub use metrics::{MetricsSample, MetricsSource, SystemSnapshot};
pub use types::{format_bytes, format_uptime, ConnectionStatus, DeviceInfo};
