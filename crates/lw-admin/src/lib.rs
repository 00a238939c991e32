//! lw-admin: the monitoring side of lanwatch
//!
//! The admin dials workers over the control protocol, keeps a registry
//! of their live state, and reaches into them over SSH for shells and
//! one-shot commands.

pub mod connector;
pub mod registry;
pub mod remote;

pub use connector::AdminConnector;
pub use registry::DeviceRegistry;
pub use remote::{run_remote_command, RemoteClient, RemoteError};
