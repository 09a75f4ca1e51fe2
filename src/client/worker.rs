//! The single task that owns all session state.
//!
//! Manager handles send [`Command`]s; transport callbacks send [`Command::Transport`]
//! tagged with the generation of the session that produced them.

use super::{ClientState, ConnectionState, SessionSnapshot};
use crate::infrastructure::{BackoffPolicy, FailureKind, SessionEvent, SessionObserver};
use crate::messaging::InboundRelay;
use crate::session::{ConnectionSession, SessionCallbacks};
use crate::transport::{ConnectOptions, TransportFactory, TransportFailure};
use crate::types::{OutboundMessage, Result, SessionError, SessionIdentity};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub(crate) enum Command {
    Connect {
        initial: Option<OutboundMessage>,
        reply: oneshot::Sender<Result<()>>,
    },
    Publish(OutboundMessage),
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    ReconnectDue {
        ticket: u64,
    },
    Transport {
        session: u64,
        event: TransportEvent,
    },
}

pub(crate) enum TransportEvent {
    Connected(SessionIdentity),
    Disconnected,
    Failed(TransportFailure),
    Message(Bytes),
}

pub(crate) struct WorkerConfig {
    pub connect_options: ConnectOptions,
    pub backoff: BackoffPolicy,
    pub max_reconnect_attempts: Option<u32>,
    pub inbound_prefix: String,
    pub inbound_suffix: String,
}

pub(crate) struct SessionWorker {
    config: WorkerConfig,
    transport: Arc<dyn TransportFactory>,
    observer: Arc<dyn SessionObserver>,
    relay: InboundRelay,
    state: ClientState,
    commands: mpsc::WeakUnboundedSender<Command>,
}

fn forward(commands: &mpsc::WeakUnboundedSender<Command>, session: u64, event: TransportEvent) {
    if let Some(tx) = commands.upgrade() {
        let _ = tx.send(Command::Transport { session, event });
    }
}

impl SessionWorker {
    pub fn new(
        config: WorkerConfig,
        transport: Arc<dyn TransportFactory>,
        observer: Arc<dyn SessionObserver>,
        relay: InboundRelay,
        state: ClientState,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
            relay,
            state,
            commands,
        }
    }

    /// Process commands until every manager handle is dropped
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Session worker started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        self.shutdown();
        tracing::debug!("Session worker finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { initial, reply } => {
                let result = self.connect(initial);
                let _ = reply.send(result);
            }
            Command::Publish(message) => self.publish(message),
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            Command::ReconnectDue { ticket } => self.reconnect_due(ticket),
            Command::Transport { session, event } => self.transport_event(session, event),
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    fn connect(&mut self, initial: Option<OutboundMessage>) -> Result<()> {
        match self.state.connection {
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(SessionError::AlreadyConnected);
            }
            ConnectionState::Abandoned => self.state.attempts = 0,
            ConnectionState::Disconnected => {}
        }

        self.state.was_manual_disconnect = false;
        self.state.reconnect.cancel();

        if let Some(initial) = initial
            && let Some(owed) = self.state.pending_initial.replace(initial)
        {
            // The earlier connect's payload is still owed
            self.enqueue(owed);
        }

        self.start_session();
        Ok(())
    }

    fn callbacks(&self, session: u64) -> SessionCallbacks {
        let (on_connect, on_disconnect, on_error, on_message) = (
            self.commands.clone(),
            self.commands.clone(),
            self.commands.clone(),
            self.commands.clone(),
        );
        SessionCallbacks {
            on_connect: Arc::new(move |identity| {
                forward(&on_connect, session, TransportEvent::Connected(identity))
            }),
            on_disconnect: Arc::new(move || {
                forward(&on_disconnect, session, TransportEvent::Disconnected)
            }),
            on_error: Arc::new(move |failure| {
                forward(&on_error, session, TransportEvent::Failed(failure))
            }),
            on_message: Arc::new(move |body| {
                forward(&on_message, session, TransportEvent::Message(body))
            }),
        }
    }

    /// Replace any existing session with a freshly activated one
    fn start_session(&mut self) {
        self.teardown_session();

        let id = self.state.next_session_id();
        let mut session = ConnectionSession::new(
            id,
            self.transport.as_ref(),
            self.config.connect_options.clone(),
            self.callbacks(id),
        );

        self.state.set_connection(ConnectionState::Connecting);
        self.emit(SessionEvent::Connecting {
            attempt: self.state.attempts,
        });

        let activation = session.activate();
        self.state.session = Some(session);
        if let Err(e) = activation {
            self.fail(FailureKind::Connect, e.to_string(), None);
        }
    }

    fn teardown_session(&mut self) {
        if let Some(mut session) = self.state.session.take() {
            session.deactivate();
        }
        self.state.identity = None;
    }

    fn transport_event(&mut self, session: u64, event: TransportEvent) {
        if self.state.current_session_id() != Some(session) {
            tracing::trace!(session, "Ignoring event from stale session");
            return;
        }

        match event {
            TransportEvent::Connected(identity) => self.on_connected(identity),
            TransportEvent::Disconnected => self.connection_lost(),
            TransportEvent::Failed(TransportFailure::Connect(reason)) => {
                self.fail(FailureKind::Connect, reason, None);
            }
            TransportEvent::Failed(TransportFailure::Protocol { message, details }) => {
                self.fail(FailureKind::Protocol, message, Some(details));
            }
            TransportEvent::Message(body) => {
                if let Some(identity) = &self.state.identity
                    && self.state.connection.is_connected()
                {
                    self.emit(SessionEvent::MessageReceived {
                        identity: identity.clone(),
                        bytes: body.len(),
                    });
                    self.relay.push(body);
                }
            }
        }
    }

    fn on_connected(&mut self, identity: SessionIdentity) {
        if self.state.connection != ConnectionState::Connecting {
            return;
        }
        self.state.reconnect.cancel();
        self.state.attempts = 0;

        let address =
            identity.inbound_address(&self.config.inbound_prefix, &self.config.inbound_suffix);
        let subscribed = match self.state.session.as_mut() {
            Some(session) => session.subscribe(&address),
            None => return,
        };
        if let Err(e) = subscribed {
            self.fail(FailureKind::Connect, e.to_string(), None);
            return;
        }

        self.state.identity = Some(identity.clone());
        self.state.set_connection(ConnectionState::Connected);
        self.emit(SessionEvent::Connected { identity });

        self.drain();

        if self.state.connection.is_connected()
            && let Some(initial) = self.state.pending_initial.take()
        {
            self.send_now(initial);
        }
    }

    /// Flush the queue in FIFO order, stopping at the first send failure
    fn drain(&mut self) {
        let mut sent = 0usize;
        while self.state.connection.is_connected() {
            let Some(message) = self.state.queue.pop_front() else {
                break;
            };
            match self.transmit(&message) {
                Ok(()) => sent += 1,
                Err(SessionError::InvalidPayload(reason)) => self.reject(message, reason),
                Err(e) => {
                    self.state.queue.requeue_front(message);
                    self.fail(FailureKind::Send, e.to_string(), None);
                }
            }
        }
        if sent > 0 {
            tracing::debug!(sent, remaining = self.state.queue.len(), "Drained outbound queue");
        }
    }

    fn transmit(&self, message: &OutboundMessage) -> Result<()> {
        let session = self
            .state
            .session
            .as_ref()
            .ok_or_else(|| SessionError::SendFailure("no active session".to_string()))?;
        session.publish(message)?;
        self.emit(SessionEvent::PublishSent {
            destination: message.destination.clone(),
            bytes: message.len(),
        });
        Ok(())
    }

    /// Send on the live session; a failure re-queues and runs the failure path
    fn send_now(&mut self, message: OutboundMessage) {
        match self.transmit(&message) {
            Ok(()) => {}
            Err(SessionError::InvalidPayload(reason)) => self.reject(message, reason),
            Err(e) => {
                self.state.queue.requeue_front(message);
                self.fail(FailureKind::Send, e.to_string(), None);
            }
        }
    }

    /// Drop a payload the transport can never carry; the session stays up
    fn reject(&self, message: OutboundMessage, reason: String) {
        tracing::warn!(
            destination = %message.destination,
            bytes = message.len(),
            "Dropping payload the transport cannot carry: {}",
            reason
        );
        self.emit(SessionEvent::PublishRejected {
            destination: message.destination,
            reason,
        });
    }

    fn publish(&mut self, message: OutboundMessage) {
        if self.state.connection.is_connected() && self.state.queue.is_empty() {
            self.send_now(message);
        } else {
            self.enqueue(message);
            if self.state.connection.is_connected() {
                self.drain();
            }
        }
    }

    fn enqueue(&mut self, message: OutboundMessage) {
        let destination = message.destination.clone();
        match self.state.queue.push(message) {
            Ok(evicted) => {
                if let Some(evicted) = evicted {
                    tracing::warn!(
                        destination = %evicted.destination,
                        "Outbound queue full, dropped oldest payload"
                    );
                    self.emit(SessionEvent::QueueOverflow {
                        destination: evicted.destination,
                        rejected: false,
                    });
                }
                self.emit(SessionEvent::PublishQueued {
                    destination,
                    queued: self.state.queue.len(),
                });
            }
            Err(_) => {
                tracing::warn!(
                    destination = %destination,
                    capacity = self.state.queue.capacity(),
                    "Outbound queue full, rejected payload"
                );
                self.emit(SessionEvent::QueueOverflow {
                    destination,
                    rejected: true,
                });
            }
        }
    }

    fn fail(&mut self, kind: FailureKind, message: String, details: Option<String>) {
        if !self.state.connection.is_active() {
            return;
        }
        self.emit(SessionEvent::Error {
            kind,
            message,
            details,
        });
        self.connection_lost();
    }

    /// Tear down, count the failure, then reconnect or give up
    fn connection_lost(&mut self) {
        if !self.state.connection.is_active() {
            return;
        }
        self.teardown_session();
        self.state.set_connection(ConnectionState::Disconnected);
        self.emit(SessionEvent::Disconnected { manual: false });

        self.state.attempts = self.state.attempts.saturating_add(1);
        if let Some(max) = self.config.max_reconnect_attempts
            && self.state.attempts > max
        {
            self.state.set_connection(ConnectionState::Abandoned);
            self.emit(SessionEvent::Abandoned {
                attempts: self.state.attempts,
            });
            return;
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.state.attempts;
        let delay = self.config.backoff.delay(attempt);
        let commands = self.commands.clone();
        self.state.reconnect.schedule(delay, move |ticket| async move {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ReconnectDue { ticket });
            }
        });
        self.emit(SessionEvent::ReconnectScheduled { attempt, delay });
    }

    fn reconnect_due(&mut self, ticket: u64) {
        if !self.state.reconnect.fire(ticket) {
            tracing::trace!(ticket, "Ignoring stale reconnect");
            return;
        }
        if self.state.was_manual_disconnect
            || self.state.connection != ConnectionState::Disconnected
        {
            return;
        }
        self.emit(SessionEvent::ReconnectAttempt {
            attempt: self.state.attempts,
        });
        self.start_session();
    }

    fn disconnect(&mut self) {
        self.state.was_manual_disconnect = true;
        let cancelled = self.state.reconnect.cancel();
        let had_session = self.state.session.is_some();

        if let Some(initial) = self.state.pending_initial.take() {
            self.enqueue(initial);
        }

        if !had_session && !cancelled && self.state.connection == ConnectionState::Disconnected {
            return;
        }

        self.teardown_session();
        self.state.set_connection(ConnectionState::Disconnected);
        self.emit(SessionEvent::Disconnected { manual: true });
        tracing::debug!(queued = self.state.queue.len(), "Session torn down");
    }

    fn shutdown(&mut self) {
        self.state.reconnect.cancel();
        self.teardown_session();
        self.state.set_connection(ConnectionState::Disconnected);
    }
}
