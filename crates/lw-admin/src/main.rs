//! lanwatch admin CLI
//!
//! Watches workers over the control protocol and runs remote commands
//! through their embedded SSH service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lw_admin::{run_remote_command, AdminConnector, DeviceRegistry};
use lw_core::config::{DEFAULT_SSH_PORT, DEFAULT_SSH_USERNAME};
use lw_core::{format_bytes, format_uptime, AdminConfig, AdminEvents};

#[derive(Parser)]
#[command(name = "lw-admin")]
#[command(about = "lanwatch admin - monitor workers and run remote commands")]
#[command(version)]
struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to workers and print their metrics until interrupted
    Watch {
        /// Worker addresses (host or host:port)
        #[arg(required = true)]
        hosts: Vec<String>,

        /// Refresh cadence of the printed table, in seconds
        #[arg(long, default_value_t = 2)]
        refresh: u64,
    },

    /// Run a command on a worker over SSH
    Exec {
        /// Worker host
        host: String,

        /// Command line to run
        command: String,

        /// SSH port of the worker
        #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
        ssh_port: u16,

        /// SSH username
        #[arg(long, default_value = DEFAULT_SSH_USERNAME)]
        user: String,

        /// SSH password (defaults to the LW_SSH_PASSWORD variable)
        #[arg(long)]
        password: Option<String>,
    },
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

    match args.command {
        Command::Watch { hosts, refresh } => watch(hosts, refresh).await,
        Command::Exec {
            host,
            command,
            ssh_port,
            user,
            password,
        } => {
            let password = password
                .or_else(|| std::env::var("LW_SSH_PASSWORD").ok())
                .unwrap_or_else(|| "admin".to_string());

            match run_remote_command(&host, ssh_port, &user, &password, &command).await {
                Ok(output) => {
                    print!("{}", output);
                    Ok(())
                }
                Err(lw_admin::RemoteError::CommandFailed { code, output }) => {
                    print!("{}", output);
                    std::process::exit(code as i32);
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

async fn watch(hosts: Vec<String>, refresh: u64) -> Result<()> {
    let registry = Arc::new(DeviceRegistry::new());
    let connector = AdminConnector::new(
        AdminConfig::default(),
        Arc::clone(&registry) as Arc<dyn AdminEvents>,
    );

    for host in &hosts {
        if let Err(e) = connector.connect(host).await {
            eprintln!("{}: {}", host, e);
        }
    }

    if connector.connected_workers().is_empty() {
        anyhow::bail!("No workers reachable");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(refresh.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => print_devices(&registry),
        }
    }

    for host in &hosts {
        connector.disconnect(host).await;
    }
    Ok(())
}

fn print_devices(registry: &DeviceRegistry) {
    let devices = registry.list();
    if devices.is_empty() {
        println!("(no connected workers)");
        return;
    }

    for device in devices {
        println!(
            "{:<24} {:<14} cpu {:5.1}%  ram {:5.1}% ({} / {})  gpu {:5.1}%  up {}",
            device.id,
            device.hostname,
            device.cpu_usage,
            device.ram_usage,
            format_bytes(device.ram_used),
            format_bytes(device.ram_total),
            device.gpu_usage,
            format_uptime(device.uptime_secs),
        );
    }
    println!();
}
