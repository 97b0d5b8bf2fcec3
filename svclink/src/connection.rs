//! Connection lifecycle for the channel to the service process.

use tokio::sync::oneshot;

use crate::bridge::channel::Channel;

/// Where the channel to the worker currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Channel ownership and connect bookkeeping for one control instance.
///
/// Owned by the control task; all mutation happens on that single consumer,
/// so the invariants hold without locking:
/// - the channel handle is `Some` iff the state is `Connected`
/// - connect waiters are pending only while `Connecting`
///
/// Overlapping connect requests join the in-flight attempt rather than
/// overwriting a single continuation slot; every waiter is resolved exactly
/// once with the attempt's outcome.
pub struct Connection {
    state: ConnectionState,
    channel: Option<Channel>,
    waiters: Vec<oneshot::Sender<bool>>,
    epoch: u64,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            channel: None,
            waiters: Vec::new(),
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Identifies the current attempt; completions carrying an older epoch
    /// are stale and must be ignored.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a waiter for the connect outcome. Returns `true` when this
    /// waiter starts a fresh attempt and the caller must initiate the open;
    /// an already-connected instance resolves the waiter immediately.
    pub fn begin_connect(&mut self, waiter: oneshot::Sender<bool>) -> bool {
        match self.state {
            ConnectionState::Connected => {
                let _ = waiter.send(true);
                false
            }
            ConnectionState::Connecting => {
                self.waiters.push(waiter);
                false
            }
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                self.epoch += 1;
                self.waiters.push(waiter);
                true
            }
        }
    }

    /// Attempt succeeded: store the channel, resolve every waiter.
    pub fn complete(&mut self, channel: Channel) {
        self.state = ConnectionState::Connected;
        self.channel = Some(channel);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(true);
        }
    }

    /// Attempt failed: back to Disconnected, resolve every waiter.
    pub fn fail(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.channel = None;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(false);
        }
    }

    /// Tear the channel down (shutdown or transport error). Any waiter still
    /// pending resolves as a failure, and the epoch advances so in-flight
    /// attempt completions are discarded as stale.
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.channel = None;
        self.epoch += 1;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(false);
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_channel() -> Channel {
        let (tx, _rx) = mpsc::unbounded_channel();
        Channel::new(tx)
    }

    #[test]
    fn starts_disconnected_without_channel() {
        let conn = Connection::new();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.channel().is_none());
    }

    #[tokio::test]
    async fn first_connect_starts_attempt_and_resolves_on_complete() {
        let mut conn = Connection::new();
        let (tx, rx) = oneshot::channel();

        assert!(conn.begin_connect(tx));
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.complete(test_channel());
        assert!(conn.is_connected());
        assert!(conn.channel().is_some());
        assert_eq!(rx.await, Ok(true));
    }

    #[tokio::test]
    async fn overlapping_connects_share_one_attempt() {
        let mut conn = Connection::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        assert!(conn.begin_connect(tx1));
        assert!(!conn.begin_connect(tx2));

        conn.complete(test_channel());
        assert_eq!(rx1.await, Ok(true));
        assert_eq!(rx2.await, Ok(true));
    }

    #[tokio::test]
    async fn connect_while_connected_resolves_immediately() {
        let mut conn = Connection::new();
        let (tx, rx) = oneshot::channel();
        assert!(conn.begin_connect(tx));
        conn.complete(test_channel());

        let (tx2, rx2) = oneshot::channel();
        assert!(!conn.begin_connect(tx2));
        assert_eq!(rx2.await, Ok(true));
        let _ = rx;
    }

    #[tokio::test]
    async fn failed_attempt_resolves_false_and_returns_to_disconnected() {
        let mut conn = Connection::new();
        let (tx, rx) = oneshot::channel();
        assert!(conn.begin_connect(tx));

        conn.fail();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.channel().is_none());
        assert_eq!(rx.await, Ok(false));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_waiters_and_bumps_epoch() {
        let mut conn = Connection::new();
        let (tx, rx) = oneshot::channel();
        assert!(conn.begin_connect(tx));
        let attempt = conn.epoch();

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.epoch() > attempt);
        assert_eq!(rx.await, Ok(false));
    }

    #[test]
    fn each_attempt_gets_a_fresh_epoch() {
        let mut conn = Connection::new();
        let (tx, _rx) = oneshot::channel();
        assert!(conn.begin_connect(tx));
        let first = conn.epoch();
        conn.fail();

        let (tx, _rx) = oneshot::channel();
        assert!(conn.begin_connect(tx));
        assert!(conn.epoch() > first);
    }
}
