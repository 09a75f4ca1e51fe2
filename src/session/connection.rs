use crate::transport::{
    ConnectAck, ConnectOptions, FrameHandler, Subscription, TransportClient, TransportFactory,
    TransportFailure, TransportListener,
};
use crate::types::{OutboundMessage, Result, SessionError, SessionIdentity};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const ACTIVATING: u8 = 1;
const CONNECTED: u8 = 2;
const CLOSED: u8 = 3;

/// Callbacks a session reports to its owner
#[derive(Clone)]
pub struct SessionCallbacks {
    pub on_connect: Arc<dyn Fn(SessionIdentity) + Send + Sync>,
    pub on_disconnect: Arc<dyn Fn() + Send + Sync>,
    pub on_error: Arc<dyn Fn(TransportFailure) + Send + Sync>,
    pub on_message: FrameHandler,
}

/// Listener handed to the transport. Filters callbacks by activation phase.
struct PhaseGuard {
    phase: AtomicU8,
    callbacks: SessionCallbacks,
}

impl PhaseGuard {
    fn is_connected(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == CONNECTED
    }

    /// Move to CLOSED; true if this call ended a live activation
    fn close(&self) -> bool {
        matches!(self.phase.swap(CLOSED, Ordering::SeqCst), ACTIVATING | CONNECTED)
    }
}

impl TransportListener for PhaseGuard {
    fn on_connect(&self, ack: ConnectAck) {
        if self
            .phase
            .compare_exchange(ACTIVATING, CONNECTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            (self.callbacks.on_connect)(SessionIdentity::new(ack.session_id));
        } else {
            tracing::trace!("Dropping connect acknowledgment outside activation");
        }
    }

    fn on_disconnect(&self) {
        if self.close() {
            (self.callbacks.on_disconnect)();
        }
    }

    fn on_error(&self, failure: TransportFailure) {
        if self.close() {
            (self.callbacks.on_error)(failure);
        } else {
            tracing::trace!("Dropping transport failure after close: {}", failure);
        }
    }
}

/// One transport connection attempt and the subscription it carries.
///
/// A session is activated at most once. After [`deactivate`](Self::deactivate)
/// none of its callbacks fire again, even if the transport keeps reporting.
pub struct ConnectionSession {
    id: u64,
    client: Arc<dyn TransportClient>,
    options: ConnectOptions,
    guard: Arc<PhaseGuard>,
    subscription: Option<Box<dyn Subscription>>,
    activated: bool,
    deactivated: bool,
}

impl ConnectionSession {
    pub fn new(
        id: u64,
        factory: &dyn TransportFactory,
        options: ConnectOptions,
        callbacks: SessionCallbacks,
    ) -> Self {
        Self {
            id,
            client: factory.create(),
            options,
            guard: Arc::new(PhaseGuard {
                phase: AtomicU8::new(IDLE),
                callbacks,
            }),
            subscription: None,
            activated: false,
            deactivated: false,
        }
    }

    /// Generation tag of this session
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn activate(&mut self) -> Result<()> {
        if self
            .guard
            .phase
            .compare_exchange(IDLE, ACTIVATING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::ConnectFailure(
                "session was already activated".to_string(),
            ));
        }
        self.activated = true;

        let listener: Arc<dyn TransportListener> = self.guard.clone();
        if let Err(e) = self.client.activate(self.options.clone(), listener) {
            self.guard.phase.store(CLOSED, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Release the subscription and tear the transport down. Idempotent.
    pub fn deactivate(&mut self) {
        if self.deactivated {
            return;
        }
        self.deactivated = true;
        self.unsubscribe();
        self.guard.phase.store(CLOSED, Ordering::SeqCst);
        if self.activated {
            self.client.deactivate();
        }
        tracing::debug!(session = self.id, "Session deactivated");
    }

    pub fn is_connected(&self) -> bool {
        self.guard.is_connected()
    }

    /// Route frames from `address` to `on_message`, replacing any prior subscription
    pub fn subscribe(&mut self, address: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::SendFailure(
                "cannot subscribe before the session is connected".to_string(),
            ));
        }
        self.unsubscribe();

        let guard = Arc::clone(&self.guard);
        let handler: FrameHandler = Arc::new(move |body: Bytes| {
            if guard.is_connected() {
                (guard.callbacks.on_message)(body);
            }
        });
        self.subscription = Some(self.client.subscribe(address, handler)?);
        tracing::debug!(session = self.id, address, "Subscribed");
        Ok(())
    }

    /// Release the current subscription; false if none was held
    pub fn unsubscribe(&mut self) -> bool {
        match self.subscription.take() {
            Some(subscription) => {
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    pub fn publish(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::SendFailure(
                "session is not connected".to_string(),
            ));
        }
        self.client
            .publish(&message.destination, message.body.clone())
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.deactivate();
    }
}
