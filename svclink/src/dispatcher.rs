//! Routing of inbound service events.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::bridge::protocol::{ServiceEvent, ServiceStatus};

/// Caller-registered sink for unsolicited messages from the worker.
///
/// Callbacks run on the control task and are expected to return promptly;
/// this is not a queueing layer.
pub trait NotificationHandler: Send + Sync {
    /// The worker signalled it is alive.
    fn on_heartbeat(&self);
}

/// Routes each inbound event, in arrival order, to the notification handler
/// or to the waiters of the outstanding status query.
///
/// Status queries coalesce: while one is on the wire, further waiters join
/// the list and the single reply resolves all of them.
#[derive(Default)]
pub struct Dispatcher {
    handler: Option<Arc<dyn NotificationHandler>>,
    pending_status: Vec<oneshot::Sender<ServiceStatus>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handler(&mut self, handler: Arc<dyn NotificationHandler>) {
        self.handler = Some(handler);
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// True when a status query is already on the wire; callers then join
    /// the waiter list instead of sending another request.
    pub fn status_in_flight(&self) -> bool {
        !self.pending_status.is_empty()
    }

    pub fn push_status_waiter(&mut self, waiter: oneshot::Sender<ServiceStatus>) {
        self.pending_status.push(waiter);
    }

    /// Drop every pending status waiter; their callers observe the query as
    /// never answered. Used when the channel dies before a reply.
    pub fn abandon_pending(&mut self) {
        if !self.pending_status.is_empty() {
            tracing::debug!(
                waiters = self.pending_status.len(),
                "abandoning status waiters"
            );
            self.pending_status.clear();
        }
    }

    pub fn dispatch(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Heartbeat => match &self.handler {
                Some(handler) => handler.on_heartbeat(),
                None => tracing::debug!("heartbeat with no handler registered, dropping"),
            },
            ServiceEvent::Status { enabled, identity } => {
                if self.pending_status.is_empty() {
                    tracing::warn!("status reply with no outstanding query, dropping");
                    return;
                }
                let status = ServiceStatus { enabled, identity };
                for waiter in self.pending_status.drain(..) {
                    let _ = waiter.send(status.clone());
                }
            }
        }
    }
}
