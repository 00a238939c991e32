//! Sysinfo-backed metrics collection
//!
//! GPU numbers come from `nvidia-smi` when present. The probe is
//! best-effort: the first failure disables it for the lifetime of the
//! process so a missing binary is not re-spawned once a second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sysinfo::System;

use lw_core::{MetricsSample, MetricsSource, SystemSnapshot};

/// Metrics source backed by the sysinfo crate
pub struct SysinfoCollector {
    system: Mutex<System>,
    gpu_available: AtomicBool,
}

impl SysinfoCollector {
    /// Create a new collector
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            gpu_available: AtomicBool::new(true),
        }
    }

    fn gpu_usage(&self) -> f64 {
        if !self.gpu_available.load(Ordering::Relaxed) {
            return 0.0;
        }
        match query_nvidia_smi("--query-gpu=utilization.gpu") {
            Some(output) => output.trim().parse::<f64>().unwrap_or(0.0),
            None => {
                self.gpu_available.store(false, Ordering::Relaxed);
                0.0
            }
        }
    }

    fn gpu_name(&self) -> String {
        if !self.gpu_available.load(Ordering::Relaxed) {
            return "N/A".to_string();
        }
        match query_nvidia_smi("--query-gpu=name") {
            Some(output) => output.trim().to_string(),
            None => {
                self.gpu_available.store(false, Ordering::Relaxed);
                "N/A".to_string()
            }
        }
    }
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoCollector {
    fn sample(&self) -> std::io::Result<MetricsSample> {
        let (cpu, ram) = {
            let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
            system.refresh_cpu_usage();
            system.refresh_memory();

            let cpu = system.global_cpu_usage() as f64;
            let total = system.total_memory();
            let ram = if total > 0 {
                system.used_memory() as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (cpu, ram)
        };

        Ok(MetricsSample {
            cpu,
            ram,
            gpu: self.gpu_usage(),
        })
    }

    fn snapshot(&self) -> SystemSnapshot {
        let (cpu_usage, ram_usage, ram_total, ram_used) = {
            let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
            system.refresh_cpu_usage();
            system.refresh_memory();

            let total = system.total_memory();
            let used = system.used_memory();
            let ram = if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (system.global_cpu_usage() as f64, ram, total, used)
        };

        let hostname = gethostname::gethostname().to_string_lossy().into_owned();

        SystemSnapshot {
            hostname,
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_usage,
            ram_usage,
            ram_total,
            ram_used,
            gpu_name: self.gpu_name(),
            gpu_usage: self.gpu_usage(),
            internet_speed: "N/A".to_string(),
            uptime_secs: System::uptime(),
        }
    }
}

fn query_nvidia_smi(query: &str) -> Option<String> {
    let output = std::process::Command::new("nvidia-smi")
        .arg(query)
        .arg("--format=csv,noheader,nounits")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_percentage_bounds() {
        let collector = SysinfoCollector::new();
        let sample = collector.sample().unwrap();
        assert!(sample.ram >= 0.0 && sample.ram <= 100.0);
        assert!(sample.cpu >= 0.0);
    }

    #[test]
    fn test_snapshot_has_identity_fields() {
        let collector = SysinfoCollector::new();
        let snapshot = collector.snapshot();
        assert!(!snapshot.hostname.is_empty());
        assert!(!snapshot.architecture.is_empty());
        assert!(snapshot.ram_total >= snapshot.ram_used);
    }
}
