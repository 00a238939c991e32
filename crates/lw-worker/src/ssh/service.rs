//! Embedded SSH server
//!
//! Password-authenticated, one handler per connection. A `shell`
//! request gets a pipe-backed platform shell; an `exec` request runs a
//! single adapted command with its stdin closed and reports the exit
//! status. Credentials are read through a shared lock on every
//! authentication attempt, so a runtime change applies to the next
//! attempt without restarting the service.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use russh_keys::key::KeyPair;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use lw_core::SshCredentials;

use super::launcher::{platform_launcher, CommandLauncher};

/// Stream number for stderr in extended data
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// The embedded SSH service
pub struct SshHostService {
    config: Arc<russh::server::Config>,
    credentials: Arc<RwLock<SshCredentials>>,
    launcher: Arc<dyn CommandLauncher>,
}

/// Handle to a running SSH service
pub struct SshHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl SshHandle {
    /// Address the service is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl SshHostService {
    /// Create a new service with the platform launcher
    pub fn new(host_key: KeyPair, credentials: Arc<RwLock<SshCredentials>>) -> Self {
        Self::with_launcher(host_key, credentials, platform_launcher())
    }

    /// Create a new service with an explicit launcher
    pub fn with_launcher(
        host_key: KeyPair,
        credentials: Arc<RwLock<SshCredentials>>,
        launcher: Arc<dyn CommandLauncher>,
    ) -> Self {
        let mut config = russh::server::Config::default();
        config.keys.push(host_key);
        config.auth_rejection_time = std::time::Duration::from_secs(1);
        config.auth_rejection_time_initial = Some(std::time::Duration::from_secs(0));

        Self {
            config: Arc::new(config),
            credentials,
            launcher,
        }
    }

    /// Bind the SSH port and start accepting connections
    pub async fn bind(self, bind_addr: &str) -> Result<SshHandle> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind SSH port at {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        tracing::info!("SSH service listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let accept_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => {
                        tracing::info!("SSH service shutting down");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((socket, peer_addr)) => {
                                self.handle_connection(socket, peer_addr, accept_cancel.clone());
                            }
                            Err(e) => {
                                tracing::error!("Failed to accept SSH connection: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(SshHandle { local_addr, cancel })
    }

    fn handle_connection(
        &self,
        socket: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        cancel: CancellationToken,
    ) {
        tracing::info!("SSH connection from {}", peer_addr);

        let config = Arc::clone(&self.config);
        let handler = SessionHandler {
            peer_addr,
            credentials: Arc::clone(&self.credentials),
            launcher: Arc::clone(&self.launcher),
            shell_stdin: None,
        };

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = russh::server::run_stream(config, socket, handler) => result,
            };

            match result {
                Ok(session) => {
                    if let Err(e) = session.await {
                        tracing::debug!("SSH session from {} ended with error: {}", peer_addr, e);
                    } else {
                        tracing::info!("SSH session from {} closed", peer_addr);
                    }
                }
                Err(e) => {
                    tracing::warn!("SSH handshake with {} failed: {}", peer_addr, e);
                }
            }
        });
    }
}

/// Handler for a single SSH connection
struct SessionHandler {
    peer_addr: SocketAddr,
    credentials: Arc<RwLock<SshCredentials>>,
    launcher: Arc<dyn CommandLauncher>,
    /// Stdin of the running shell, present between shell_request and
    /// channel teardown
    shell_stdin: Option<ChildStdin>,
}

#[async_trait]
impl Handler for SessionHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let accepted = self.credentials.read().await.matches(user, password);

        if accepted {
            tracing::info!("SSH login from {} as {}", self.peer_addr, user);
            Ok(Auth::Accept)
        } else {
            tracing::warn!("SSH login rejected from {} (user {})", self.peer_addr, user);
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Channel opened: {:?}", channel.id());
        Ok(true)
    }

    /// Acknowledge PTY requests without allocating one
    ///
    /// The shell runs on pipes; clients that insist on a terminal still
    /// get a working session, just without raw-mode features.
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("PTY requested ({}), acknowledged without allocation", term);
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let mut cmd = self.launcher.shell_command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn shell: {}", e);
                session.channel_failure(channel);
                return Ok(());
            }
        };

        // Stdin stays with the handler so data() can feed the shell;
        // everything else moves to the pump task
        self.shell_stdin = child.stdin.take();
        let stdout = child.stdout.take().context("Shell stdout not captured")?;
        let stderr = child.stderr.take().context("Shell stderr not captured")?;

        tracing::info!("Shell started for {}", self.peer_addr);
        tokio::spawn(pump_shell(session.handle(), channel, child, stdout, stderr));
        session.channel_success(channel);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command_line = String::from_utf8_lossy(data).into_owned();
        tracing::info!("Exec from {}: {}", self.peer_addr, command_line);

        let mut cmd = self.launcher.exec_command(&command_line);
        // One-shot commands get no input; anything that blocks on a
        // prompt fails fast instead of hanging the channel
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => {
                tokio::spawn(run_exec(session.handle(), channel, child));
                session.channel_success(channel);
            }
            Err(e) => {
                tracing::error!("Failed to spawn command: {}", e);
                session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(stdin) = self.shell_stdin.as_mut() {
            if let Err(e) = stdin.write_all(data).await {
                tracing::debug!("Shell stdin closed: {}", e);
                self.shell_stdin = None;
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF: {:?}", channel);
        // Dropping stdin lets the shell see EOF and exit on its own
        self.shell_stdin = None;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        self.shell_stdin = None;
        Ok(())
    }
}

/// Forward shell output to the client until the shell exits
async fn pump_shell(
    handle: Handle,
    channel: ChannelId,
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
) {
    let out_task = tokio::spawn(copy_stream(handle.clone(), channel, stdout, None));
    let err_task = tokio::spawn(copy_stream(
        handle.clone(),
        channel,
        stderr,
        Some(SSH_EXTENDED_DATA_STDERR),
    ));

    let status = child.wait().await;
    let _ = out_task.await;
    let _ = err_task.await;

    let code = match status {
        Ok(status) => status.code().unwrap_or(0) as u32,
        Err(e) => {
            tracing::warn!("Failed to reap shell: {}", e);
            1
        }
    };

    let _ = handle.exit_status_request(channel, code).await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

/// Run a one-shot command to completion and report its outcome
async fn run_exec(handle: Handle, channel: ChannelId, child: Child) {
    let output = match child.wait_with_output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Command failed to run: {}", e);
            let _ = handle.exit_status_request(channel, 1).await;
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
            return;
        }
    };

    if !output.stdout.is_empty() {
        let _ = handle
            .data(channel, CryptoVec::from_slice(&output.stdout))
            .await;
    }
    if !output.stderr.is_empty() {
        let _ = handle
            .extended_data(
                channel,
                SSH_EXTENDED_DATA_STDERR,
                CryptoVec::from_slice(&output.stderr),
            )
            .await;
    }

    let code = output.status.code().unwrap_or(0) as u32;
    let _ = handle.exit_status_request(channel, code).await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

async fn copy_stream<R>(handle: Handle, channel: ChannelId, mut reader: R, ext: Option<u32>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let data = CryptoVec::from_slice(&buf[..n]);
                let result = match ext {
                    Some(stream) => handle.extended_data(channel, stream, data).await,
                    None => handle.data(channel, data).await,
                };
                if result.is_err() {
                    break;
                }
            }
        }
    }
}
