//! Control-protocol listener
//!
//! Accepts admin connections on the control port and drives one session
//! at a time. The first accepted connection becomes the active session;
//! any further connection is answered with a `Busy` message and closed
//! without touching the active one.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use lw_core::{MetricsSource, WorkerEvents};
use lw_protocol::{EnvelopeCodec, Message, MetricsPayload};

/// Default cadence of the metrics stream
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// Control listener for the worker role
pub struct WorkerListener {
    metrics: Arc<dyn MetricsSource>,
    events: Arc<dyn WorkerEvents>,
    metrics_interval: Duration,
}

/// Handle to a running control listener
pub struct WorkerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl WorkerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and tear down the active session
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl WorkerListener {
    /// Create a new listener with the default metrics cadence
    pub fn new(metrics: Arc<dyn MetricsSource>, events: Arc<dyn WorkerEvents>) -> Self {
        Self {
            metrics,
            events,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
        }
    }

    /// Override the metrics cadence
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Bind the control port and start accepting admin connections
    pub async fn bind(self, bind_addr: &str) -> Result<WorkerHandle> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind control port at {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        tracing::info!("Control listener on {}", local_addr);

        let cancel = CancellationToken::new();
        let accept_cancel = cancel.clone();

        // Address of the admin currently holding the single session slot
        let active: Arc<Mutex<Option<SocketAddr>>> = Arc::new(Mutex::new(None));

        let metrics = self.metrics;
        let events = self.events;
        let interval = self.metrics_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => {
                        tracing::info!("Control listener shutting down");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((socket, peer_addr)) => {
                                handle_accept(
                                    socket,
                                    peer_addr,
                                    Arc::clone(&active),
                                    Arc::clone(&metrics),
                                    Arc::clone(&events),
                                    interval,
                                    accept_cancel.clone(),
                                );
                            }
                            Err(e) => {
                                tracing::error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(WorkerHandle { local_addr, cancel })
    }
}

fn handle_accept(
    socket: TcpStream,
    peer_addr: SocketAddr,
    active: Arc<Mutex<Option<SocketAddr>>>,
    metrics: Arc<dyn MetricsSource>,
    events: Arc<dyn WorkerEvents>,
    interval: Duration,
    parent_cancel: CancellationToken,
) {
    // Claim the session slot before any I/O so two racing admins
    // cannot both become active
    {
        let mut slot = active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(holder) = *slot {
            tracing::info!(
                "Rejecting connection from {} (busy with {})",
                peer_addr,
                holder
            );
            tokio::spawn(reject_busy(socket, peer_addr));
            return;
        }
        *slot = Some(peer_addr);
    }

    tracing::info!("Admin connected from {}", peer_addr);

    tokio::spawn(async move {
        let cancel = parent_cancel.child_token();

        let result = tokio::select! {
            _ = parent_cancel.cancelled() => Ok(()),
            result = run_session(socket, Arc::clone(&metrics), Arc::clone(&events), interval, cancel.clone()) => result,
        };
        cancel.cancel();

        match result {
            Ok(()) => tracing::info!("Session with {} ended", peer_addr),
            Err(e) => tracing::warn!("Session with {} ended with error: {}", peer_addr, e),
        }

        // Event first: once the slot frees up a new admin may win it
        // immediately, and the listener must look idle by then
        events.on_admin_disconnect();
        active.lock().unwrap_or_else(|e| e.into_inner()).take();
    });
}

/// Tell a surplus admin the worker is taken, then close
async fn reject_busy(socket: TcpStream, peer_addr: SocketAddr) {
    let mut framed = Framed::new(socket, EnvelopeCodec::new());
    if let Err(e) = framed.send(Message::Busy).await {
        tracing::debug!("Failed to send busy reply to {}: {}", peer_addr, e);
    }
    // The codec encodes both raw envelopes and typed messages, so the
    // sink item has to be named here
    let _ = SinkExt::<Message>::close(&mut framed).await;
}

async fn run_session(
    socket: TcpStream,
    metrics: Arc<dyn MetricsSource>,
    events: Arc<dyn WorkerEvents>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let framed = Framed::new(socket, EnvelopeCodec::new());
    let (mut sink, mut stream) = framed.split();

    let (tx, mut rx) = mpsc::channel::<Message>(32);

    // Writer task: sole owner of the sink
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                message = rx.recv() => {
                    match message {
                        Some(message) => {
                            if let Err(e) = sink.send(message).await {
                                tracing::debug!("Write failed: {}", e);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    // The snapshot goes out before anything else on the wire
    let snapshot = metrics.snapshot();
    let payload = snapshot.into_payload(lw_core::net::local_ip_string());
    tx.send(Message::SystemInfo(payload))
        .await
        .context("Connection closed before system info was sent")?;

    // Metrics stream at a fixed cadence
    let metrics_tx = tx.clone();
    let metrics_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the snapshot already
        // carried fresh numbers
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = metrics_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sample = match metrics.sample() {
                        Ok(sample) => sample,
                        Err(e) => {
                            tracing::warn!("Metrics sampling failed: {}", e);
                            continue;
                        }
                    };
                    let message = Message::Metrics(MetricsPayload {
                        cpu_usage: sample.cpu,
                        ram_usage: sample.ram,
                        gpu_usage: sample.gpu,
                    });
                    if metrics_tx.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Receive loop
    while let Some(envelope) = stream.next().await {
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Dropping undecodable envelope: {}", e);
                continue;
            }
        };

        let message = match Message::from_envelope(&envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring message of kind {:#04x}: {}", envelope.kind, e);
                continue;
            }
        };

        match message {
            Message::Ping => {
                if tx.send(Message::Pong).await.is_err() {
                    break;
                }
            }
            Message::AdminInfo(info) => {
                tracing::info!("Admin identified as {}", info.hostname);
                events.on_admin_connect(&info.hostname);
            }
            Message::Disconnect => {
                tracing::info!("Admin requested disconnect");
                break;
            }
            Message::Command(cmd) => {
                // Reserved on the control channel; remote execution
                // goes through the SSH service
                tracing::debug!("Ignoring control-channel command: {}", cmd.command);
            }
            other => {
                tracing::debug!("Unexpected message from admin: {:?}", other.kind());
            }
        }
    }

    // Stops the metrics task too, which still holds a sender clone
    cancel.cancel();
    drop(tx);
    let _ = writer.await;

    Ok(())
}
