//! Configuration for the worker and admin roles

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Well-known control port workers listen on
pub const DEFAULT_CONTROL_PORT: u16 = 9876;

/// Alternate port for the embedded SSH service (avoids clashing with a
/// system sshd)
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default SSH credentials for a fresh install
pub const DEFAULT_SSH_USERNAME: &str = "admin";
pub const DEFAULT_SSH_PASSWORD: &str = "admin";

/// Serde helper for durations expressed as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Configuration for the worker role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// TCP port for the control protocol
    pub control_port: u16,

    /// TCP port for the embedded SSH service
    pub ssh_port: u16,

    /// Cadence of the metrics stream
    #[serde(with = "duration_secs")]
    pub metrics_interval: Duration,

    /// Where the SSH host key lives
    pub host_key_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            ssh_port: DEFAULT_SSH_PORT,
            metrics_interval: Duration::from_secs(1),
            host_key_path: default_host_key_path(),
        }
    }
}

/// Configuration for the admin role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Control port workers are expected to listen on
    pub worker_port: u16,

    /// Dial budget for a control connection. Generous because a
    /// first-time connection may sit behind a firewall prompt on the
    /// worker machine.
    #[serde(with = "duration_secs")]
    pub dial_timeout: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            worker_port: DEFAULT_CONTROL_PORT,
            dial_timeout: Duration::from_secs(60),
        }
    }
}

/// SSH username/password pair
///
/// Mutable at runtime: the worker operator may change it while the
/// service is listening, and the authentication callback always reads
/// the current value through its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    /// Expected username
    pub username: String,
    /// Expected password
    pub password: String,
}

impl Default for SshCredentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_SSH_USERNAME.to_string(),
            password: DEFAULT_SSH_PASSWORD.to_string(),
        }
    }
}

impl SshCredentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether the offered pair matches
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lanwatch")
}

/// Default location of the persisted SSH host key
pub fn default_host_key_path() -> PathBuf {
    default_config_dir().join("ssh_host_key")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
