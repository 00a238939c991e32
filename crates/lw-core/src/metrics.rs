//! Metrics-collaborator interface
//!
//! Local metrics collection is an external collaborator from the
//! network core's point of view: a synchronous, side-effect-free query
//! surface. The worker binary wires in a sysinfo-backed implementation;
//! tests substitute a stub.

use lw_protocol::SystemInfoPayload;

/// A single live metrics sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSample {
    /// CPU usage percentage
    pub cpu: f64,
    /// RAM usage percentage
    pub ram: f64,
    /// GPU usage percentage
    pub gpu: f64,
}

/// Full system snapshot taken once per admin connection
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    /// Hostname
    pub hostname: String,
    /// Operating system name
    pub os: String,
    /// CPU architecture
    pub architecture: String,
    /// CPU usage percentage
    pub cpu_usage: f64,
    /// RAM usage percentage
    pub ram_usage: f64,
    /// Total RAM in bytes
    pub ram_total: u64,
    /// Used RAM in bytes
    pub ram_used: u64,
    /// GPU model name
    pub gpu_name: String,
    /// GPU usage percentage
    pub gpu_usage: f64,
    /// Informational link-speed string
    pub internet_speed: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl SystemSnapshot {
    /// Turn the snapshot into a wire payload, stamping in the detected
    /// outbound address
    pub fn into_payload(self, ip_address: String) -> SystemInfoPayload {
        SystemInfoPayload {
            hostname: self.hostname,
            os: self.os,
            architecture: self.architecture,
            ip_address,
            cpu_usage: self.cpu_usage,
            ram_usage: self.ram_usage,
            ram_total: self.ram_total,
            ram_used: self.ram_used,
            gpu_name: self.gpu_name,
            gpu_usage: self.gpu_usage,
            internet_speed: self.internet_speed,
            uptime_secs: self.uptime_secs,
        }
    }
}

/// Source of local host metrics consumed by the worker listener
pub trait MetricsSource: Send + Sync {
    /// Sample the dynamic metrics (CPU/RAM/GPU usage)
    fn sample(&self) -> std::io::Result<MetricsSample>;

    /// Take a full system snapshot
    fn snapshot(&self) -> SystemSnapshot;
}
