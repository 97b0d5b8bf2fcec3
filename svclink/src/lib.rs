//! svclink: control plane for service worker processes.

pub mod bridge;
mod connection;
mod control;
mod dispatcher;
mod ident;
mod launcher;
mod registry;

pub use bridge::channel::{
    Channel, ChannelEvent, ChannelTarget, ChannelTransport, ConnectError, UnixChannelTransport,
};
pub use bridge::protocol::{ControlRequest, ServiceEvent, ServiceStatus};
pub use connection::ConnectionState;
pub use control::{ControlConfig, ServiceControl};
pub use dispatcher::NotificationHandler;
pub use ident::{OwnerId, ServiceKind};
pub use launcher::{ExecSpawner, LaunchOutcome, Launcher, ServiceSpawner, SpawnError};
pub use registry::{ControlKey, ControlRegistry};
