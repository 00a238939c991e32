//! Integration tests for the control listener
//!
//! Each test binds a listener on an ephemeral localhost port and talks
//! to it with a raw framed TCP client, the same way an admin would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use lw_core::{MetricsSample, MetricsSource, SystemSnapshot, WorkerEvents};
use lw_protocol::{AdminInfoPayload, EnvelopeCodec, Message};
use lw_worker::{WorkerHandle, WorkerListener};

struct StubMetrics;

impl MetricsSource for StubMetrics {
    fn sample(&self) -> std::io::Result<MetricsSample> {
        Ok(MetricsSample {
            cpu: 12.5,
            ram: 40.0,
            gpu: 0.0,
        })
    }

    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            hostname: "stub-worker".to_string(),
            os: "Linux".to_string(),
            architecture: "x86_64".to_string(),
            cpu_usage: 12.5,
            ram_usage: 40.0,
            ram_total: 8 * 1024 * 1024 * 1024,
            ram_used: 3 * 1024 * 1024 * 1024,
            gpu_name: "N/A".to_string(),
            gpu_usage: 0.0,
            internet_speed: "N/A".to_string(),
            uptime_secs: 3600,
        }
    }
}

#[derive(Default)]
struct CountingEvents {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl WorkerEvents for CountingEvents {
    fn on_admin_connect(&self, _hostname: &str) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_admin_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

async fn start_worker(
    interval: Duration,
) -> (WorkerHandle, Arc<CountingEvents>) {
    let events = Arc::new(CountingEvents::default());
    let listener = WorkerListener::new(Arc::new(StubMetrics), Arc::clone(&events) as Arc<dyn WorkerEvents>)
        .with_metrics_interval(interval);
    let handle = listener.bind("127.0.0.1:0").await.unwrap();
    (handle, events)
}

async fn connect(handle: &WorkerHandle) -> Framed<TcpStream, EnvelopeCodec> {
    let socket = TcpStream::connect(handle.local_addr()).await.unwrap();
    Framed::new(socket, EnvelopeCodec::new())
}

async fn recv_message(framed: &mut Framed<TcpStream, EnvelopeCodec>) -> Message {
    let envelope = tokio::time::timeout(Duration::from_secs(5), framed.next())
        .await
        .expect("timed out waiting for message")
        .expect("connection closed")
        .expect("decode error");
    Message::from_envelope(&envelope).expect("unknown message")
}

#[tokio::test]
async fn system_info_is_first_on_the_wire() {
    let (handle, _events) = start_worker(Duration::from_millis(50)).await;
    let mut client = connect(&handle).await;

    match recv_message(&mut client).await {
        Message::SystemInfo(info) => {
            assert_eq!(info.hostname, "stub-worker");
            assert_eq!(info.ram_total, 8 * 1024 * 1024 * 1024);
        }
        other => panic!("expected SystemInfo first, got {:?}", other),
    }

    handle.shutdown();
}

#[tokio::test]
async fn metrics_stream_at_configured_cadence() {
    let interval = Duration::from_millis(25);
    let (handle, _events) = start_worker(interval).await;
    let mut client = connect(&handle).await;

    // Skip the snapshot
    assert!(matches!(
        recv_message(&mut client).await,
        Message::SystemInfo(_)
    ));

    // Anchor the window at the first sample so connection setup time
    // does not count against the cadence
    assert!(matches!(
        recv_message(&mut client).await,
        Message::Metrics(_)
    ));

    let window: u32 = 10;
    let deadline = tokio::time::Instant::now() + interval * window;
    let mut samples: u32 = 0;
    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, client.next()).await {
            Ok(Some(Ok(envelope))) => {
                if let Ok(Message::Metrics(m)) = Message::from_envelope(&envelope) {
                    assert_eq!(m.cpu_usage, 12.5);
                    assert_eq!(m.ram_usage, 40.0);
                    samples += 1;
                }
            }
            Ok(_) => panic!("stream ended during the window"),
            Err(_) => break,
        }
    }

    // One sample per interval, with slack for scheduler jitter
    assert!(
        (window - 2..=window + 1).contains(&samples),
        "{} samples in a {}-interval window",
        samples,
        window
    );

    handle.shutdown();
}

#[tokio::test]
async fn ping_gets_pong() {
    let (handle, _events) = start_worker(Duration::from_secs(3600)).await;
    let mut client = connect(&handle).await;

    assert!(matches!(
        recv_message(&mut client).await,
        Message::SystemInfo(_)
    ));

    client.send(Message::Ping).await.unwrap();
    assert_eq!(recv_message(&mut client).await, Message::Pong);

    handle.shutdown();
}

#[tokio::test]
async fn admin_info_fires_connect_event() {
    let (handle, events) = start_worker(Duration::from_secs(3600)).await;
    let mut client = connect(&handle).await;

    assert!(matches!(
        recv_message(&mut client).await,
        Message::SystemInfo(_)
    ));

    client
        .send(Message::AdminInfo(AdminInfoPayload {
            hostname: "admin-box".to_string(),
        }))
        .await
        .unwrap();

    // Use a ping as a barrier: once the pong is back, AdminInfo has
    // been processed
    client.send(Message::Ping).await.unwrap();
    assert_eq!(recv_message(&mut client).await, Message::Pong);
    assert_eq!(events.connects.load(Ordering::SeqCst), 1);

    handle.shutdown();
}

#[tokio::test]
async fn second_admin_is_rejected_with_busy() {
    let (handle, _events) = start_worker(Duration::from_secs(3600)).await;

    let mut first = connect(&handle).await;
    assert!(matches!(
        recv_message(&mut first).await,
        Message::SystemInfo(_)
    ));

    let mut second = connect(&handle).await;
    assert_eq!(recv_message(&mut second).await, Message::Busy);

    // The rejected connection is closed by the worker
    let eof = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await
        .unwrap();
    assert!(eof.is_none());

    // The active session is untouched
    first.send(Message::Ping).await.unwrap();
    loop {
        match recv_message(&mut first).await {
            Message::Pong => break,
            Message::Metrics(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    handle.shutdown();
}

#[tokio::test]
async fn disconnect_frees_the_slot_exactly_once() {
    let (handle, events) = start_worker(Duration::from_secs(3600)).await;

    let mut client = connect(&handle).await;
    assert!(matches!(
        recv_message(&mut client).await,
        Message::SystemInfo(_)
    ));

    client.send(Message::Disconnect).await.unwrap();
    drop(client);

    // The slot frees up and a new admin can take it
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut retry = connect(&handle).await;
        match recv_message(&mut retry).await {
            Message::SystemInfo(_) => break,
            Message::Busy => {
                assert!(tokio::time::Instant::now() < deadline, "slot never freed");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    assert_eq!(events.disconnects.load(Ordering::SeqCst), 1);
    handle.shutdown();
}

#[tokio::test]
async fn unknown_message_kind_is_ignored() {
    let (handle, _events) = start_worker(Duration::from_secs(3600)).await;
    let mut client = connect(&handle).await;

    assert!(matches!(
        recv_message(&mut client).await,
        Message::SystemInfo(_)
    ));

    // An envelope with a kind this worker has never heard of
    client
        .send(lw_protocol::Envelope::new(
            0x7F,
            bytes::Bytes::from_static(b"future"),
        ))
        .await
        .unwrap();

    // The session survives it
    client.send(Message::Ping).await.unwrap();
    assert_eq!(recv_message(&mut client).await, Message::Pong);

    handle.shutdown();
}
