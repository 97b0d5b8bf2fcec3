//! Channel transport seam between the control task and the service process.
//!
//! The transport never calls into control-plane state. Inbound messages,
//! transport errors, and peer close are posted as [`ChannelEvent`]s onto a
//! queue the control task consumes, so every state transition happens on a
//! single consumer in arrival order.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::FrameCodec;
use crate::bridge::protocol::{ControlRequest, ServiceEvent};
use crate::ident::{OwnerId, ServiceKind};

/// Control traffic is sparse; the inbound queue only absorbs dispatch jitter.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Endpoint where a service process listens for its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    path: PathBuf,
}

impl ChannelTarget {
    /// Endpoint under the system temp dir: `svclink-{owner}-{kind}.sock`.
    pub fn for_instance(owner: &OwnerId, kind: &ServiceKind) -> Self {
        let path = std::env::temp_dir().join(format!("svclink-{owner}-{kind}.sock"));
        Self { path }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a worker appears to be listening here. Spawners use this as
    /// the already-running probe.
    pub fn is_reachable(&self) -> bool {
        self.path.exists()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to open channel: {0}")]
    Io(#[from] io::Error),
    #[error("channel open timed out")]
    Timeout,
}

/// Events the transport posts for the control task, in arrival order.
#[derive(Debug)]
pub enum ChannelEvent {
    /// An inbound message from the service process.
    Message(ServiceEvent),
    /// The transport failed after a successful connect.
    Error(io::Error),
    /// The peer closed the channel.
    Closed,
}

/// Write half of an open channel.
///
/// `send` reports write acceptance only; delivery is never confirmed.
#[derive(Debug, Clone)]
pub struct Channel {
    outbound: mpsc::UnboundedSender<ControlRequest>,
}

impl Channel {
    /// Build a channel from the queue a transport implementation drains.
    pub fn new(outbound: mpsc::UnboundedSender<ControlRequest>) -> Self {
        Self { outbound }
    }

    pub fn send(&self, msg: ControlRequest) -> bool {
        self.outbound.send(msg).is_ok()
    }
}

/// Abstract bidirectional, ordered message pipe to a service process.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the channel. On success the returned queue carries every inbound
    /// message followed by a terminal [`ChannelEvent::Error`] or
    /// [`ChannelEvent::Closed`]. Closing is dropping the [`Channel`].
    async fn open(
        &self,
        target: &ChannelTarget,
    ) -> Result<(Channel, mpsc::Receiver<ChannelEvent>), ConnectError>;
}

/// Production transport: length-prefixed JSON frames over a Unix domain
/// socket the worker listens on.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixChannelTransport;

impl UnixChannelTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelTransport for UnixChannelTransport {
    async fn open(
        &self,
        target: &ChannelTarget,
    ) -> Result<(Channel, mpsc::Receiver<ChannelEvent>), ConnectError> {
        let stream = UnixStream::connect(target.path()).await?;
        tracing::debug!(path = %target.path().display(), "channel open");

        let (read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_pump(
            FramedWrite::new(write_half, FrameCodec::new()),
            outbound_rx,
        ));
        tokio::spawn(read_pump(
            FramedRead::new(read_half, FrameCodec::new()),
            event_tx,
        ));

        Ok((Channel::new(outbound_tx), event_rx))
    }
}

async fn write_pump(
    mut sink: FramedWrite<tokio::net::unix::OwnedWriteHalf, FrameCodec<ControlRequest>>,
    mut outbound: mpsc::UnboundedReceiver<ControlRequest>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = sink.send(msg).await {
            tracing::warn!(error = %e, "channel write failed");
            break;
        }
    }
    tracing::trace!("channel write pump exiting");
}

async fn read_pump(
    mut stream: FramedRead<tokio::net::unix::OwnedReadHalf, FrameCodec<ServiceEvent>>,
    events: mpsc::Sender<ChannelEvent>,
) {
    loop {
        match stream.next().await {
            Some(Ok(msg)) => {
                if events.send(ChannelEvent::Message(msg)).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                let _ = events.send(ChannelEvent::Error(e)).await;
                break;
            }
            None => {
                let _ = events.send(ChannelEvent::Closed).await;
                break;
            }
        }
    }
    tracing::trace!("channel read pump exiting");
}
