//! Event-listener interfaces
//!
//! Connection events are delivered through explicit trait objects so
//! the UI, the device registry, logging and tests can each plug in a
//! concrete listener. Callbacks fire on whatever task the network loop
//! runs on; implementations that touch shared UI state must marshal
//! onto their own execution context.

use crate::types::DeviceInfo;

/// Events delivered to the admin role by its connector
pub trait AdminEvents: Send + Sync {
    /// A worker's one-time system snapshot arrived; establishes the record
    fn on_device_update(&self, device: DeviceInfo);

    /// A live metrics sample arrived. High-frequency: implementations
    /// must not block.
    fn on_metrics(&self, id: &str, cpu: f64, ram: f64, gpu: f64);

    /// The control connection to a worker ended
    fn on_worker_disconnect(&self, id: &str);
}

/// Events delivered to the worker role by its listener
pub trait WorkerEvents: Send + Sync {
    /// An admin identified itself on the active control connection
    fn on_admin_connect(&self, hostname: &str);

    /// The active control connection ended (fires exactly once per session)
    fn on_admin_disconnect(&self);
}
