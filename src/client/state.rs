use crate::infrastructure::ReconnectTimer;
use crate::messaging::OutboundQueue;
use crate::session::ConnectionSession;
use crate::types::{OutboundMessage, SessionIdentity};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Gave up after the configured number of attempts; terminal until `connect`
    Abandoned,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    /// Payloads waiting in the outbound queue
    pub queued: usize,
    /// Failed attempts since the last successful connect
    pub attempts: u32,
    pub session_id: Option<SessionIdentity>,
    pub reconnect_pending: bool,
    pub reconnect_delay: Option<Duration>,
    /// Whether the initial payload of the last `connect` is still owed
    pub initial_pending: bool,
}

/// Consolidated mutable state owned by the session worker
pub struct ClientState {
    /// Current connection state, mirrored to watchers
    pub connection: ConnectionState,

    /// Payloads waiting for a connected session
    pub queue: OutboundQueue,

    /// Reconnect attempt counter
    pub attempts: u32,

    /// The one live session, if any
    pub session: Option<ConnectionSession>,

    /// Identity of the connected session
    pub identity: Option<SessionIdentity>,

    /// One-shot payload sent after the first successful drain
    pub pending_initial: Option<OutboundMessage>,

    /// Pending reconnect
    pub reconnect: ReconnectTimer,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    session_counter: u64,
    state_change_tx: watch::Sender<ConnectionState>,
}

impl ClientState {
    pub fn new(queue: OutboundQueue, state_change_tx: watch::Sender<ConnectionState>) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            queue,
            attempts: 0,
            session: None,
            identity: None,
            pending_initial: None,
            reconnect: ReconnectTimer::new(),
            was_manual_disconnect: false,
            session_counter: 0,
            state_change_tx,
        }
    }

    /// Generation tag for the next session
    pub fn next_session_id(&mut self) -> u64 {
        self.session_counter += 1;
        self.session_counter
    }

    /// Generation tag of the live session
    pub fn current_session_id(&self) -> Option<u64> {
        self.session.as_ref().map(ConnectionSession::id)
    }

    /// Set connection state and notify watchers
    pub fn set_connection(&mut self, state: ConnectionState) {
        if self.connection == state {
            return;
        }
        tracing::debug!("Connection state {:?} -> {:?}", self.connection, state);
        self.connection = state;
        self.state_change_tx.send_replace(state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.connection,
            queued: self.queue.len(),
            attempts: self.attempts,
            session_id: self.identity.clone(),
            reconnect_pending: self.reconnect.is_pending(),
            reconnect_delay: self.reconnect.pending_delay(),
            initial_pending: self.pending_initial.is_some(),
        }
    }
}
