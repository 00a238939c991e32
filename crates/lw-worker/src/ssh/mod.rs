//! Embedded SSH service
//!
//! Every worker hosts a small password-authenticated SSH server so an
//! admin can open a shell or run one-shot commands without a system
//! sshd. The host key is generated once and persisted so clients do not
//! see a new fingerprint on every restart.

pub mod hostkey;
pub mod launcher;
pub mod service;

pub use hostkey::load_or_create_host_key;
pub use launcher::{platform_launcher, CommandLauncher, PosixLauncher, WindowsLauncher};
pub use service::{SshHandle, SshHostService};
