//! SSH remote control client
//!
//! Talks to the embedded SSH service on a worker. Host keys are
//! accepted without verification: workers generate their own keys and
//! the trust boundary is the LAN plus the password, not a known-hosts
//! file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect, Pty};
use russh_keys::key::PublicKey;
use thiserror::Error;

/// Errors from the remote control client
#[derive(Debug, Error)]
pub enum RemoteError {
    /// TCP or SSH handshake failure
    #[error("Cannot reach SSH service at {host}:{port}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
    },

    /// Worker rejected the credentials
    #[error("SSH authentication failed for {user}@{host}")]
    AuthenticationFailed { host: String, user: String },

    /// Command ran but exited non-zero
    #[error("Command exited with status {code}: {output}")]
    CommandFailed { code: u32, output: String },

    /// SSH protocol error on an established session
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),
}

/// Accepts any host key; see the module docs
struct AcceptingClient;

#[async_trait]
impl client::Handler for AcceptingClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Worker host key: {}", server_public_key.fingerprint());
        Ok(true)
    }
}

/// SSH client for one worker
pub struct RemoteClient {
    session: Handle<AcceptingClient>,
}

// The session handle carries no Debug impl of its own
impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient").finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Connect and authenticate with a password
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<Self, RemoteError> {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            ..Default::default()
        };

        let mut session = client::connect(Arc::new(config), (host, port), AcceptingClient)
            .await
            .map_err(|e| RemoteError::ConnectionFailed {
                host: host.to_string(),
                port,
                message: e.to_string(),
            })?;

        let authenticated = session.authenticate_password(username, password).await?;
        if !authenticated {
            return Err(RemoteError::AuthenticationFailed {
                host: host.to_string(),
                user: username.to_string(),
            });
        }

        tracing::info!("SSH session open to {}:{} as {}", host, port, username);
        Ok(Self { session })
    }

    /// Run a one-shot command and return its combined output
    ///
    /// Opens a fresh channel per call, so one client can run any number
    /// of commands. A non-zero exit status becomes an error carrying
    /// the output the command produced.
    pub async fn execute(&self, command: &str) -> Result<String, RemoteError> {
        let mut channel = self.session.channel_open_session().await?;

        // Some tools change behavior without a terminal; request one
        // but carry on when the worker declines
        let _ = channel
            .request_pty(
                false,
                "xterm",
                80,
                40,
                0,
                0,
                &[
                    (Pty::ECHO, 0),
                    (Pty::TTY_OP_ISPEED, 14400),
                    (Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await;

        channel.exec(true, command).await?;

        let mut output = Vec::new();
        let mut exit_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    output.extend_from_slice(&data);
                }
                ChannelMsg::ExtendedData { data, .. } => {
                    output.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                }
                _ => {}
            }
        }

        let output = String::from_utf8_lossy(&output).into_owned();
        match exit_code {
            Some(0) | None => Ok(output),
            Some(code) => Err(RemoteError::CommandFailed { code, output }),
        }
    }

    /// Close the session
    pub async fn close(&self) -> Result<(), RemoteError> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Connect, run a single command, and close the session
pub async fn run_remote_command(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    command: &str,
) -> Result<String, RemoteError> {
    let client = RemoteClient::connect(host, port, username, password).await?;
    let result = client.execute(command).await;
    let _ = client.close().await;
    result
}
