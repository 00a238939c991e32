//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use lw_protocol::SystemInfoPayload;

/// Everything the admin knows about a connected worker
///
/// Created from the worker's one-time `system_info` message and mutated
/// in place by subsequent `metrics` messages. The identifier defaults
/// to the peer address the admin dialed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Registry identifier (defaults to the worker address)
    pub id: String,
    /// Worker hostname
    pub hostname: String,
    /// Operating system name
    pub os: String,
    /// CPU architecture
    pub architecture: String,
    /// Worker's own preferred LAN address
    pub ip_address: String,
    /// Live CPU usage percentage
    pub cpu_usage: f64,
    /// Live RAM usage percentage
    pub ram_usage: f64,
    /// Total RAM in bytes
    pub ram_total: u64,
    /// Used RAM in bytes
    pub ram_used: u64,
    /// GPU model name
    pub gpu_name: String,
    /// Live GPU usage percentage
    pub gpu_usage: f64,
    /// Informational link-speed string
    pub internet_speed: String,
    /// Uptime in seconds at snapshot time
    pub uptime_secs: u64,
}

impl DeviceInfo {
    /// Build a device record from a worker's system snapshot
    pub fn from_system_info(id: impl Into<String>, info: &SystemInfoPayload) -> Self {
        Self {
            id: id.into(),
            hostname: info.hostname.clone(),
            os: info.os.clone(),
            architecture: info.architecture.clone(),
            ip_address: info.ip_address.clone(),
            cpu_usage: info.cpu_usage,
            ram_usage: info.ram_usage,
            ram_total: info.ram_total,
            ram_used: info.ram_used,
            gpu_name: info.gpu_name.clone(),
            gpu_usage: info.gpu_usage,
            internet_speed: info.internet_speed.clone(),
            uptime_secs: info.uptime_secs,
        }
    }

    /// Apply a live metrics sample in place
    pub fn apply_metrics(&mut self, cpu: f64, ram: f64, gpu: f64) {
        self.cpu_usage = cpu;
        self.ram_usage = ram;
        self.gpu_usage = gpu;
    }
}

/// Connection status for a worker as seen by the admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Dial in progress
    Connecting,
    /// Control connection established
    Connected,
    /// No control connection
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Format a byte count as a human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

/// Format an uptime in seconds as a human readable string
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
