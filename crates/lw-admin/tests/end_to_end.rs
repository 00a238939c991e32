//! End-to-end tests: a real worker on localhost, driven by the admin
//! connector and the SSH remote client.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use lw_admin::{AdminConnector, DeviceRegistry, RemoteClient, RemoteError};
use lw_core::{
    AdminConfig, AdminEvents, ConnectError, MetricsSample, MetricsSource, SshCredentials,
    SystemSnapshot, WorkerEvents,
};
use lw_worker::ssh::SshHostService;
use lw_worker::{load_or_create_host_key, WorkerHandle, WorkerListener};

struct StubMetrics;

impl MetricsSource for StubMetrics {
    fn sample(&self) -> std::io::Result<MetricsSample> {
        Ok(MetricsSample {
            cpu: 55.0,
            ram: 65.0,
            gpu: 5.0,
        })
    }

    fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            hostname: "e2e-worker".to_string(),
            os: "Linux".to_string(),
            architecture: "x86_64".to_string(),
            cpu_usage: 10.0,
            ram_usage: 20.0,
            ram_total: 4 * 1024 * 1024 * 1024,
            ram_used: 1024 * 1024 * 1024,
            gpu_name: "N/A".to_string(),
            gpu_usage: 0.0,
            internet_speed: "N/A".to_string(),
            uptime_secs: 120,
        }
    }
}

struct NoEvents;

impl WorkerEvents for NoEvents {
    fn on_admin_connect(&self, _hostname: &str) {}
    fn on_admin_disconnect(&self) {}
}

async fn start_worker() -> WorkerHandle {
    WorkerListener::new(Arc::new(StubMetrics), Arc::new(NoEvents))
        .with_metrics_interval(Duration::from_millis(20))
        .bind("127.0.0.1:0")
        .await
        .unwrap()
}

fn admin_config() -> AdminConfig {
    AdminConfig {
        dial_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn snapshot_metrics_and_disconnect_flow() {
    let worker = start_worker().await;
    let addr = worker.local_addr().to_string();

    let registry = Arc::new(DeviceRegistry::new());
    let connector = AdminConnector::new(
        admin_config(),
        Arc::clone(&registry) as Arc<dyn AdminEvents>,
    );

    connector.connect(&addr).await.unwrap();

    // The snapshot lands before connect() returns
    let device = registry.get(&addr).expect("device registered");
    assert_eq!(device.hostname, "e2e-worker");
    assert_eq!(device.cpu_usage, 10.0);

    // The metrics stream overwrites the live numbers
    let registry_for_wait = Arc::clone(&registry);
    let id = addr.clone();
    wait_for("metrics update", move || {
        registry_for_wait
            .get(&id)
            .map(|d| d.cpu_usage == 55.0 && d.ram_usage == 65.0)
            .unwrap_or(false)
    })
    .await;

    // Static fields are untouched by metrics
    assert_eq!(registry.get(&addr).unwrap().hostname, "e2e-worker");

    connector.disconnect(&addr).await;
    let registry_for_wait = Arc::clone(&registry);
    let id = addr.clone();
    wait_for("device removal", move || registry_for_wait.get(&id).is_none()).await;
    assert!(!connector.is_connected(&addr));

    // Disconnecting again is a no-op
    connector.disconnect(&addr).await;
    assert!(!connector.is_connected(&addr));

    worker.shutdown();
}

#[tokio::test]
async fn second_admin_sees_worker_busy() {
    let worker = start_worker().await;
    let addr = worker.local_addr().to_string();

    let first = AdminConnector::new(
        admin_config(),
        Arc::new(DeviceRegistry::new()) as Arc<dyn AdminEvents>,
    );
    first.connect(&addr).await.unwrap();

    let second = AdminConnector::new(
        admin_config(),
        Arc::new(DeviceRegistry::new()) as Arc<dyn AdminEvents>,
    );
    let err = second.connect(&addr).await.unwrap_err();
    assert!(matches!(err, ConnectError::WorkerBusy { .. }));

    // The first connection is still live
    first.send_ping(&addr).await.unwrap();

    worker.shutdown();
}

#[tokio::test]
async fn connect_to_nothing_is_refused() {
    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let connector = AdminConnector::new(
        admin_config(),
        Arc::new(DeviceRegistry::new()) as Arc<dyn AdminEvents>,
    );
    let err = connector.connect(&addr).await.unwrap_err();
    assert!(matches!(err, ConnectError::Refused { .. }));
}

async fn start_ssh(credentials: Arc<RwLock<SshCredentials>>) -> lw_worker::SshHandle {
    let dir = tempfile::tempdir().unwrap();
    let host_key = load_or_create_host_key(&dir.path().join("ssh_host_key")).unwrap();
    SshHostService::new(host_key, credentials)
        .bind("127.0.0.1:0")
        .await
        .unwrap()
}

#[tokio::test]
async fn ssh_exec_returns_output_and_exit_code() {
    let credentials = Arc::new(RwLock::new(SshCredentials::new("admin", "admin")));
    let ssh = start_ssh(credentials).await;
    let port = ssh.local_addr().port();

    let client = RemoteClient::connect("127.0.0.1", port, "admin", "admin")
        .await
        .unwrap();

    let output = client.execute("echo hello").await.unwrap();
    assert!(output.contains("hello"));

    // The same client runs any number of commands
    let err = client.execute("exit 3").await.unwrap_err();
    match err {
        RemoteError::CommandFailed { code, .. } => assert_eq!(code, 3),
        other => panic!("expected CommandFailed, got {:?}", other),
    }

    // A failing command still hands back what it printed
    let err = client.execute("ls /definitely/not/here").await.unwrap_err();
    match err {
        RemoteError::CommandFailed { code, output } => {
            assert_ne!(code, 0);
            assert!(!output.trim().is_empty(), "diagnostic output was dropped");
        }
        other => panic!("expected CommandFailed, got {:?}", other),
    }

    client.close().await.unwrap();
    ssh.shutdown();
}

#[tokio::test]
async fn ssh_rejects_wrong_password() {
    let credentials = Arc::new(RwLock::new(SshCredentials::new("admin", "right")));
    let ssh = start_ssh(credentials).await;
    let port = ssh.local_addr().port();

    let err = RemoteClient::connect("127.0.0.1", port, "admin", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::AuthenticationFailed { .. }));

    ssh.shutdown();
}

#[tokio::test]
async fn ssh_credentials_rotate_at_runtime() {
    let credentials = Arc::new(RwLock::new(SshCredentials::new("admin", "old")));
    let ssh = start_ssh(Arc::clone(&credentials)).await;
    let port = ssh.local_addr().port();

    // Works before rotation
    RemoteClient::connect("127.0.0.1", port, "admin", "old")
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    *credentials.write().await = SshCredentials::new("admin", "new");

    let err = RemoteClient::connect("127.0.0.1", port, "admin", "old")
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::AuthenticationFailed { .. }));

    RemoteClient::connect("127.0.0.1", port, "admin", "new")
        .await
        .unwrap()
        .close()
        .await
        .unwrap();

    ssh.shutdown();
}
