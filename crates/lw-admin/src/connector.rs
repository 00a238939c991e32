//! Outbound control connections
//!
//! The connector dials workers, performs the opening exchange (worker
//! snapshot in, admin identification out) and keeps one receive loop
//! per worker feeding the event listener. Workers are keyed by the
//! address the admin dialed, which is also the device id handed to the
//! listener.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use lw_core::{AdminConfig, AdminEvents, ConnectError, ConnectionStatus, DeviceInfo};
use lw_protocol::{AdminInfoPayload, EnvelopeCodec, Message};

struct WorkerLink {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

/// Per-worker link state; `Connecting` reserves the slot so two racing
/// `connect` calls cannot both dial the same worker
enum LinkState {
    Connecting,
    Connected(WorkerLink),
}

/// Dials and tracks control connections to workers
pub struct AdminConnector {
    config: AdminConfig,
    events: Arc<dyn AdminEvents>,
    links: Arc<Mutex<HashMap<String, LinkState>>>,
}

impl AdminConnector {
    /// Create a new connector delivering events to `events`
    pub fn new(config: AdminConfig, events: Arc<dyn AdminEvents>) -> Self {
        Self {
            config,
            events,
            links: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve a user-supplied target to the `host:port` used as device id
    fn resolve(&self, host: &str) -> String {
        if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, self.config.worker_port)
        }
    }

    /// Connect to a worker
    ///
    /// Blocks through the opening exchange: on return the worker's
    /// snapshot has already been delivered to the event listener.
    /// Connecting to an already connected worker is a no-op.
    pub async fn connect(&self, host: &str) -> Result<(), ConnectError> {
        let addr = self.resolve(host);

        {
            let mut links = self.lock_links();
            if links.contains_key(&addr) {
                tracing::debug!("Connection to {} already active or in progress", addr);
                return Ok(());
            }
            links.insert(addr.clone(), LinkState::Connecting);
        }

        let result = self.establish(&addr).await;
        if result.is_err() {
            self.lock_links().remove(&addr);
        }
        result
    }

    async fn establish(&self, addr: &str) -> Result<(), ConnectError> {
        let addr = addr.to_string();
        tracing::info!("Connecting to worker at {}", addr);
        let socket = tokio::time::timeout(self.config.dial_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectError::Timeout {
                addr: addr.clone(),
                port: self.config.worker_port,
            })?
            .map_err(|e| ConnectError::from_dial_error(&addr, self.config.worker_port, e))?;

        let mut framed = Framed::new(socket, EnvelopeCodec::new());

        // The worker speaks first: its snapshot, or a busy refusal
        let first = tokio::time::timeout(self.config.dial_timeout, framed.next())
            .await
            .map_err(|_| ConnectError::Timeout {
                addr: addr.clone(),
                port: self.config.worker_port,
            })?
            .ok_or_else(|| ConnectError::Unreachable {
                addr: addr.clone(),
                message: "connection closed during opening exchange".to_string(),
            })?
            .map_err(|e| ConnectError::Unreachable {
                addr: addr.clone(),
                message: e.to_string(),
            })?;

        let device = match Message::from_envelope(&first) {
            Ok(Message::SystemInfo(info)) => DeviceInfo::from_system_info(addr.clone(), &info),
            Ok(Message::Busy) => {
                return Err(ConnectError::WorkerBusy { addr });
            }
            Ok(other) => {
                return Err(ConnectError::Unreachable {
                    addr,
                    message: format!("unexpected opening message: {:?}", other.kind()),
                });
            }
            Err(e) => {
                return Err(ConnectError::Unreachable {
                    addr,
                    message: format!("undecodable opening message: {}", e),
                });
            }
        };

        // Identify ourselves before anything else goes out
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        framed
            .send(Message::AdminInfo(AdminInfoPayload { hostname }))
            .await?;

        tracing::info!("Connected to {} ({})", addr, device.hostname);
        self.events.on_device_update(device);

        let (sink, stream) = framed.split();
        let (tx, rx) = mpsc::channel::<Message>(32);
        let cancel = CancellationToken::new();

        {
            let mut links = self.lock_links();
            links.insert(
                addr.clone(),
                LinkState::Connected(WorkerLink {
                    tx,
                    cancel: cancel.clone(),
                }),
            );
        }

        tokio::spawn(run_link(
            addr,
            sink,
            stream,
            rx,
            cancel,
            Arc::clone(&self.events),
            Arc::clone(&self.links),
        ));

        Ok(())
    }

    /// Disconnect from a worker; a no-op when not connected
    pub async fn disconnect(&self, host: &str) {
        let addr = self.resolve(host);

        let link = match self.lock_links().remove(&addr) {
            Some(LinkState::Connected(link)) => link,
            Some(LinkState::Connecting) | None => return,
        };

        tracing::info!("Disconnecting from {}", addr);
        // Best effort: tell the worker before tearing the link down
        let _ = link.tx.send(Message::Disconnect).await;
        link.cancel.cancel();
    }

    /// Send a liveness probe to a worker
    pub async fn send_ping(&self, host: &str) -> Result<(), ConnectError> {
        let addr = self.resolve(host);

        let tx = {
            let links = self.lock_links();
            match links.get(&addr) {
                Some(LinkState::Connected(link)) => Some(link.tx.clone()),
                _ => None,
            }
        };

        match tx {
            Some(tx) => tx
                .send(Message::Ping)
                .await
                .map_err(|_| ConnectError::NotConnected { addr }),
            None => Err(ConnectError::NotConnected { addr }),
        }
    }

    /// Status of the link to this worker
    pub fn status(&self, host: &str) -> ConnectionStatus {
        let addr = self.resolve(host);
        match self.lock_links().get(&addr) {
            Some(LinkState::Connecting) => ConnectionStatus::Connecting,
            Some(LinkState::Connected(_)) => ConnectionStatus::Connected,
            None => ConnectionStatus::Disconnected,
        }
    }

    /// Whether a control connection to this worker is active
    pub fn is_connected(&self, host: &str) -> bool {
        self.status(host) == ConnectionStatus::Connected
    }

    /// Ids of all connected workers
    pub fn connected_workers(&self) -> Vec<String> {
        let links = self.lock_links();
        let mut ids: Vec<String> = links
            .iter()
            .filter(|(_, state)| matches!(state, LinkState::Connected(_)))
            .map(|(id, _)| id.clone())
            .collect();
        drop(links);
        ids.sort();
        ids
    }

    fn lock_links(&self) -> std::sync::MutexGuard<'_, HashMap<String, LinkState>> {
        self.links.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drive one worker link until it ends, then report the disconnect
///
/// This task is the only place the disconnect event fires, so it fires
/// exactly once per established connection no matter which side hangs
/// up first.
async fn run_link(
    addr: String,
    mut sink: futures::stream::SplitSink<Framed<TcpStream, EnvelopeCodec>, Message>,
    mut stream: futures::stream::SplitStream<Framed<TcpStream, EnvelopeCodec>>,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    events: Arc<dyn AdminEvents>,
    links: Arc<Mutex<HashMap<String, LinkState>>>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush anything disconnect() queued before the cancel
                while let Ok(message) = rx.try_recv() {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                break;
            }

            outgoing = rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            tracing::debug!("Write to {} failed: {}", addr, e);
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                let envelope = match incoming {
                    Some(Ok(envelope)) => envelope,
                    Some(Err(e)) if !e.is_fatal() => {
                        tracing::warn!("Dropping undecodable envelope from {}: {}", addr, e);
                        continue;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Connection to {} failed: {}", addr, e);
                        break;
                    }
                    None => {
                        tracing::info!("Worker {} closed the connection", addr);
                        break;
                    }
                };

                let message = match Message::from_envelope(&envelope) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("Ignoring message of kind {:#04x} from {}: {}", envelope.kind, addr, e);
                        continue;
                    }
                };

                match message {
                    Message::Metrics(m) => {
                        events.on_metrics(&addr, m.cpu_usage, m.ram_usage, m.gpu_usage);
                    }
                    Message::SystemInfo(info) => {
                        // A fresh snapshot replaces the record wholesale
                        events.on_device_update(DeviceInfo::from_system_info(addr.clone(), &info));
                    }
                    Message::Pong => {
                        tracing::trace!("Pong from {}", addr);
                    }
                    Message::Disconnect => {
                        tracing::info!("Worker {} requested disconnect", addr);
                        break;
                    }
                    other => {
                        tracing::debug!("Unexpected message from {}: {:?}", addr, other.kind());
                    }
                }
            }
        }
    }

    let _ = sink.close().await;
    links.lock().unwrap_or_else(|e| e.into_inner()).remove(&addr);
    events.on_worker_disconnect(&addr);
}
