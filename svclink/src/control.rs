//! Public control facade and its control task.
//!
//! A [`ServiceControl`] is a portal between the parent and one service
//! worker process: it launches the worker on demand, owns the channel to it,
//! and routes inbound traffic back to callers.
//!
//! All state lives in a dedicated control task. Public operations post
//! commands onto its queue and await a oneshot reply; the transport posts
//! channel events onto a second queue. The single consumer gives every
//! caller one consistent ordering of state transitions, and each oneshot is
//! a completion that fires exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::bridge::channel::{
    Channel, ChannelEvent, ChannelTarget, ChannelTransport, ConnectError, UnixChannelTransport,
};
use crate::bridge::protocol::{ControlRequest, ServiceStatus};
use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::{Dispatcher, NotificationHandler};
use crate::ident::{OwnerId, ServiceKind};
use crate::launcher::{ExecSpawner, LaunchOutcome, Launcher, ServiceSpawner};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one control instance.
///
/// The defaults assume the worker binary is named after the kind and listens
/// on the endpoint derived from (owner, kind); override with the builders.
pub struct ControlConfig {
    owner: OwnerId,
    kind: ServiceKind,
    target: ChannelTarget,
    spawner: Arc<dyn ServiceSpawner>,
    transport: Arc<dyn ChannelTransport>,
    connect_timeout: Duration,
}

impl ControlConfig {
    pub fn new(owner: OwnerId, kind: ServiceKind) -> Self {
        let target = ChannelTarget::for_instance(&owner, &kind);
        let spawner = Arc::new(ExecSpawner::new(kind.as_str(), target.clone()));
        Self {
            owner,
            kind,
            target,
            spawner,
            transport: Arc::new(UnixChannelTransport::new()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_target(mut self, target: ChannelTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ServiceSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn kind(&self) -> &ServiceKind {
        &self.kind
    }
}

enum Command {
    Launch { done: oneshot::Sender<bool> },
    Send { msg: ControlRequest, done: oneshot::Sender<bool> },
    QueryStatus { reply: oneshot::Sender<ServiceStatus> },
    Shutdown { done: oneshot::Sender<bool> },
    SetHandler(Arc<dyn NotificationHandler>),
    ClearHandler,
    State { reply: oneshot::Sender<ConnectionState> },
}

enum Internal {
    ConnectDone {
        epoch: u64,
        result: Option<(Channel, mpsc::Receiver<ChannelEvent>)>,
    },
}

/// Portal between the parent process and one service worker.
pub struct ServiceControl {
    owner: OwnerId,
    kind: ServiceKind,
    commands: mpsc::UnboundedSender<Command>,
}

impl ServiceControl {
    /// Spawns the control task; must be called within a Tokio runtime.
    /// The instance starts Disconnected.
    pub fn new(config: ControlConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let owner = config.owner;
        let kind = config.kind.clone();
        tokio::spawn(run_control_loop(config, command_rx));
        Self {
            owner,
            kind,
            commands,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn kind(&self) -> &ServiceKind {
        &self.kind
    }

    /// Launch the worker if needed and open the channel. Resolves `true`
    /// once connected, `false` on spawn or connect failure. Concurrent calls
    /// join the in-flight attempt; each resolves exactly once. A connected
    /// instance resolves `true` immediately without touching the spawner.
    pub async fn launch(&self) -> bool {
        let (done, resolved) = oneshot::channel();
        if self.commands.send(Command::Launch { done }).is_err() {
            return false;
        }
        resolved.await.unwrap_or(false)
    }

    /// Forward a raw control message. Returns `false` without side effect
    /// unless connected; `true` means the write was accepted, not delivered.
    pub async fn send(&self, msg: ControlRequest) -> bool {
        let (done, resolved) = oneshot::channel();
        if self.commands.send(Command::Send { msg, done }).is_err() {
            return false;
        }
        resolved.await.unwrap_or(false)
    }

    /// Fire-and-forget liveness probe.
    pub async fn send_hello(&self) -> bool {
        self.send(ControlRequest::Hello).await
    }

    /// Enable the tokened feature for `user` on the worker.
    pub async fn enable_feature(
        &self,
        user: impl Into<String>,
        access_token: impl Into<String>,
        relay_token: impl Into<String>,
    ) -> bool {
        self.send(ControlRequest::EnableFeature {
            user: user.into(),
            access_token: access_token.into(),
            relay_token: relay_token.into(),
        })
        .await
    }

    /// Ask the worker for its feature status. Joins the in-flight query when
    /// one is outstanding. `None` when not connected, or when the channel
    /// dies before the reply arrives.
    pub async fn query_status(&self) -> Option<ServiceStatus> {
        let (reply, resolved) = oneshot::channel();
        if self.commands.send(Command::QueryStatus { reply }).is_err() {
            return None;
        }
        resolved.await.ok()
    }

    /// Send the shutdown command (the result reflects write acceptance),
    /// then unconditionally drop the channel and return to Disconnected.
    /// No response is awaited.
    pub async fn shutdown(&self) -> bool {
        let (done, resolved) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).is_err() {
            return false;
        }
        resolved.await.unwrap_or(false)
    }

    /// Register the sink for unsolicited worker notifications, replacing any
    /// previous one.
    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        let _ = self.commands.send(Command::SetHandler(handler));
    }

    /// Unregister the notification sink; further notifications are dropped.
    pub fn clear_notification_handler(&self) {
        let _ = self.commands.send(Command::ClearHandler);
    }

    pub async fn state(&self) -> ConnectionState {
        let (reply, resolved) = oneshot::channel();
        if self.commands.send(Command::State { reply }).is_err() {
            return ConnectionState::Disconnected;
        }
        resolved.await.unwrap_or(ConnectionState::Disconnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }
}

async fn run_control_loop(config: ControlConfig, mut commands: mpsc::UnboundedReceiver<Command>) {
    let launcher = Launcher::new(Arc::clone(&config.spawner));
    let mut connection = Connection::new();
    let mut dispatcher = Dispatcher::new();
    let mut inbound: Option<mpsc::Receiver<ChannelEvent>> = None;

    // Held by the loop for its lifetime, so the internal branch never closes.
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    // Every facade handle is gone.
                    break;
                };
                match cmd {
                    Command::Launch { done } => {
                        if connection.begin_connect(done) {
                            spawn_connect_attempt(
                                launcher.clone(),
                                config.kind.clone(),
                                config.target.clone(),
                                Arc::clone(&config.transport),
                                config.connect_timeout,
                                connection.epoch(),
                                internal_tx.clone(),
                            );
                        }
                    }
                    Command::Send { msg, done } => {
                        let accepted = connection.channel().map(|c| c.send(msg)).unwrap_or(false);
                        let _ = done.send(accepted);
                    }
                    Command::QueryStatus { reply } => {
                        match connection.channel() {
                            Some(channel) => {
                                let first = !dispatcher.status_in_flight();
                                dispatcher.push_status_waiter(reply);
                                if first && !channel.send(ControlRequest::QueryStatus) {
                                    dispatcher.abandon_pending();
                                }
                            }
                            // Not connected: the query is never answered.
                            None => drop(reply),
                        }
                    }
                    Command::Shutdown { done } => {
                        let accepted = connection
                            .channel()
                            .map(|c| c.send(ControlRequest::Shutdown))
                            .unwrap_or(false);
                        teardown(&mut connection, &mut dispatcher, &mut inbound);
                        tracing::info!(kind = %config.kind, accepted, "shutdown issued");
                        let _ = done.send(accepted);
                    }
                    Command::SetHandler(handler) => dispatcher.set_handler(handler),
                    Command::ClearHandler => dispatcher.clear_handler(),
                    Command::State { reply } => {
                        let _ = reply.send(connection.state());
                    }
                }
            }

            Some(internal) = internal_rx.recv() => {
                match internal {
                    Internal::ConnectDone { epoch, result } => {
                        if epoch != connection.epoch()
                            || connection.state() != ConnectionState::Connecting
                        {
                            tracing::debug!(epoch, "stale connect completion, ignoring");
                            continue;
                        }
                        match result {
                            Some((channel, events)) => {
                                inbound = Some(events);
                                connection.complete(channel);
                                tracing::info!(kind = %config.kind, "channel connected");
                            }
                            None => connection.fail(),
                        }
                    }
                }
            }

            event = next_inbound(&mut inbound), if inbound.is_some() => {
                match event {
                    Some(ChannelEvent::Message(msg)) => dispatcher.dispatch(msg),
                    Some(ChannelEvent::Error(e)) => {
                        tracing::error!(kind = %config.kind, error = %e, "channel error, disconnecting");
                        teardown(&mut connection, &mut dispatcher, &mut inbound);
                    }
                    Some(ChannelEvent::Closed) | None => {
                        tracing::warn!(kind = %config.kind, "channel closed by peer");
                        teardown(&mut connection, &mut dispatcher, &mut inbound);
                    }
                }
            }
        }
    }

    tracing::debug!(kind = %config.kind, "control task exiting");
}

async fn next_inbound(inbound: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match inbound.as_mut() {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

fn teardown(
    connection: &mut Connection,
    dispatcher: &mut Dispatcher,
    inbound: &mut Option<mpsc::Receiver<ChannelEvent>>,
) {
    *inbound = None;
    dispatcher.abandon_pending();
    connection.disconnect();
}

/// Runs launch + connect off the control task; the outcome comes back as an
/// [`Internal::ConnectDone`] tagged with the attempt's epoch.
fn spawn_connect_attempt(
    launcher: Launcher,
    kind: ServiceKind,
    target: ChannelTarget,
    transport: Arc<dyn ChannelTransport>,
    connect_timeout: Duration,
    epoch: u64,
    internal: mpsc::UnboundedSender<Internal>,
) {
    tokio::spawn(async move {
        let outcome = launcher.launch(&kind).await;
        let result = match outcome {
            LaunchOutcome::SpawnFailed => None,
            LaunchOutcome::AlreadyRunning | LaunchOutcome::Spawned => {
                let opened = match tokio::time::timeout(connect_timeout, transport.open(&target))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ConnectError::Timeout),
                };
                match opened {
                    Ok(opened) => Some(opened),
                    Err(e) => {
                        tracing::error!(%kind, error = %e, "channel open failed");
                        None
                    }
                }
            }
        };
        let _ = internal.send(Internal::ConnectDone { epoch, result });
    });
}
