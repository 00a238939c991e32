//! lanwatch worker daemon
//!
//! Runs on every monitored machine. Serves the control protocol on one
//! port and an embedded SSH service on another; both keep running until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lw_core::config::{self, SshCredentials, WorkerConfig};
use lw_core::WorkerEvents;
use lw_worker::ssh::SshHostService;
use lw_worker::{load_or_create_host_key, SysinfoCollector, WorkerListener};

#[derive(Parser)]
#[command(name = "lw-worker")]
#[command(about = "lanwatch worker - streams metrics and serves remote control")]
#[command(version)]
struct Args {
    /// Control port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Port for the embedded SSH service
    #[arg(long)]
    ssh_port: Option<u16>,

    /// Metrics cadence in seconds
    #[arg(long)]
    metrics_interval: Option<u64>,

    /// SSH username (password is read from LW_SSH_PASSWORD when set)
    #[arg(long)]
    ssh_user: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Logs admin comings and goings
struct LogEvents;

impl WorkerEvents for LogEvents {
    fn on_admin_connect(&self, hostname: &str) {
        tracing::info!("Serving admin {}", hostname);
    }

    fn on_admin_disconnect(&self) {
        tracing::info!("Admin session over, accepting new connections");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("lanwatch worker starting...");

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("worker.toml"));

    let mut config = if config_path.exists() {
        config::load_config(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
            WorkerConfig::default()
        })
    } else {
        WorkerConfig::default()
    };

    // Apply command-line overrides
    if let Some(port) = args.port {
        config.control_port = port;
    }
    if let Some(ssh_port) = args.ssh_port {
        config.ssh_port = ssh_port;
    }
    if let Some(secs) = args.metrics_interval {
        config.metrics_interval = Duration::from_secs(secs.max(1));
    }

    let mut credentials = SshCredentials::default();
    if let Some(user) = args.ssh_user {
        credentials.username = user;
    }
    if let Ok(password) = std::env::var("LW_SSH_PASSWORD") {
        credentials.password = password;
    }
    if credentials == SshCredentials::default() {
        tracing::warn!("Using default SSH credentials; change them for anything but a lab LAN");
    }

    // Control listener
    let metrics = Arc::new(SysinfoCollector::new());
    let listener = WorkerListener::new(metrics, Arc::new(LogEvents))
        .with_metrics_interval(config.metrics_interval);
    let control = listener
        .bind(&format!("0.0.0.0:{}", config.control_port))
        .await?;

    // Embedded SSH service
    let host_key =
        load_or_create_host_key(&config.host_key_path).context("Failed to prepare host key")?;
    let ssh = SshHostService::new(host_key, Arc::new(RwLock::new(credentials)))
        .bind(&format!("0.0.0.0:{}", config.ssh_port))
        .await?;

    tracing::info!(
        "Worker ready (control {}, ssh {})",
        control.local_addr(),
        ssh.local_addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    control.shutdown();
    ssh.shutdown();

    Ok(())
}
