//! lw-worker: the monitored side of lanwatch
//!
//! A worker accepts a single admin over the control protocol, streams
//! metrics to it, and hosts an embedded SSH service for remote shells
//! and one-shot commands.

pub mod collector;
pub mod listener;
pub mod ssh;

pub use collector::SysinfoCollector;
pub use listener::{WorkerHandle, WorkerListener, DEFAULT_METRICS_INTERVAL};
pub use ssh::{load_or_create_host_key, SshHandle, SshHostService};
