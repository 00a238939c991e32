//! Device registry
//!
//! Holds the admin's view of every connected worker, keyed by the
//! address the admin dialed. One record per worker, updated in place by
//! the metrics stream and dropped when the worker disconnects. At most
//! one device is selected at a time and the selection never outlives
//! its record.

use std::collections::HashMap;
use std::sync::Mutex;

use lw_core::{AdminEvents, DeviceInfo};

#[derive(Default)]
struct RegistryInner {
    records: HashMap<String, DeviceInfo>,
    selected: Option<String>,
}

/// Thread-safe registry of connected workers
#[derive(Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a device by id
    pub fn get(&self, id: &str) -> Option<DeviceInfo> {
        self.lock().records.get(id).cloned()
    }

    /// All known devices, sorted by id for a stable listing
    pub fn list(&self) -> Vec<DeviceInfo> {
        let inner = self.lock();
        let mut devices: Vec<DeviceInfo> = inner.records.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Number of known devices
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Select a device; returns false if the id is unknown
    pub fn select(&self, id: &str) -> bool {
        let mut inner = self.lock();
        if inner.records.contains_key(id) {
            inner.selected = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Clear the selection
    pub fn clear_selection(&self) {
        self.lock().selected = None;
    }

    /// The currently selected device, if any
    pub fn selected(&self) -> Option<DeviceInfo> {
        let inner = self.lock();
        inner
            .selected
            .as_ref()
            .and_then(|id| inner.records.get(id))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AdminEvents for DeviceRegistry {
    fn on_device_update(&self, device: DeviceInfo) {
        self.lock().records.insert(device.id.clone(), device);
    }

    fn on_metrics(&self, id: &str, cpu: f64, ram: f64, gpu: f64) {
        if let Some(record) = self.lock().records.get_mut(id) {
            record.apply_metrics(cpu, ram, gpu);
        }
    }

    fn on_worker_disconnect(&self, id: &str) {
        let mut inner = self.lock();
        inner.records.remove(id);
        if inner.selected.as_deref() == Some(id) {
            inner.selected = None;
        }
    }
}
