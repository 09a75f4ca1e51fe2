use super::worker::{SessionWorker, WorkerConfig};
use super::{ClientIdentity, ClientState, ConnectionState, SessionManager};
use crate::infrastructure::{BackoffPolicy, SessionObserver, TracingObserver};
use crate::messaging::{InboundRelay, OutboundQueue, OverflowPolicy};
use crate::transport::{
    ConnectOptions, Framing, HeartbeatConfig, StompWebSocketTransport, TransportFactory,
};
use crate::types::{
    BACKOFF_BASE, BACKOFF_MAX, DEFAULT_PUBLISH_DESTINATION, HEARTBEAT_INCOMING,
    HEARTBEAT_OUTGOING, INBOUND_PREFIX, INBOUND_RELAY_CAPACITY, INBOUND_SUFFIX,
    MAX_OUTBOUND_QUEUE_SIZE, Result, SessionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Tunables for a [`SessionManager`]. Durations are in milliseconds.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub publish_destination: String,
    pub inbound_prefix: String,
    pub inbound_suffix: String,
    pub heartbeat_outgoing: Option<u64>,
    pub heartbeat_incoming: Option<u64>,
    pub reconnect_base_delay: Option<u64>,
    pub reconnect_max_delay: Option<u64>,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
    pub max_queue_size: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    pub relay_capacity: Option<usize>,
    /// Overrides the role-derived verbose flag
    pub verbose: Option<bool>,
    pub framing: Framing,
    /// Query the SockJS `/info` endpoint before each connect
    pub probe_info: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            publish_destination: DEFAULT_PUBLISH_DESTINATION.to_string(),
            inbound_prefix: INBOUND_PREFIX.to_string(),
            inbound_suffix: INBOUND_SUFFIX.to_string(),
            heartbeat_outgoing: None,
            heartbeat_incoming: None,
            reconnect_base_delay: None,
            reconnect_max_delay: None,
            max_reconnect_attempts: None,
            max_queue_size: None,
            overflow_policy: OverflowPolicy::default(),
            relay_capacity: None,
            verbose: None,
            framing: Framing::default(),
            probe_info: true,
        }
    }
}

impl SessionOptions {
    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from_millis(
            self.reconnect_base_delay.unwrap_or(BACKOFF_BASE),
            self.reconnect_max_delay.unwrap_or(BACKOFF_MAX),
        )
    }

    fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            outgoing: Duration::from_millis(self.heartbeat_outgoing.unwrap_or(HEARTBEAT_OUTGOING)),
            incoming: Duration::from_millis(self.heartbeat_incoming.unwrap_or(HEARTBEAT_INCOMING)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.publish_destination.is_empty() {
            return Err(SessionError::Configuration(
                "publish destination is required".to_string(),
            ));
        }
        let backoff = self.backoff();
        if backoff.base() > backoff.max() {
            return Err(SessionError::Configuration(format!(
                "reconnect base delay {:?} exceeds max delay {:?}",
                backoff.base(),
                backoff.max()
            )));
        }
        if self.max_queue_size == Some(0) {
            return Err(SessionError::Configuration(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.relay_capacity == Some(0) {
            return Err(SessionError::Configuration(
                "relay capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for SessionManager that validates configuration and spawns the worker
pub struct SessionManagerBuilder {
    endpoint: String,
    identity: ClientIdentity,
    options: SessionOptions,
    transport: Option<Arc<dyn TransportFactory>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl SessionManagerBuilder {
    /// Create a new builder
    pub fn new(endpoint: impl Into<String>, identity: ClientIdentity) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity,
            options: SessionOptions::default(),
            transport: None,
            observer: None,
        }
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a custom transport instead of STOMP over WebSocket
    pub fn transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(factory);
        self
    }

    /// Receive lifecycle events instead of the default tracing observer
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the manager and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<SessionManager> {
        // Validate identity is provided
        if self.identity.user_id.is_empty() {
            return Err(SessionError::Configuration("user id is required".to_string()));
        }
        self.options.validate()?;

        let transport: Arc<dyn TransportFactory> = match self.transport {
            Some(transport) => transport,
            None => {
                if self.endpoint.is_empty() {
                    return Err(SessionError::Configuration("endpoint is required".to_string()));
                }
                Arc::new(
                    StompWebSocketTransport::new(&self.endpoint)?
                        .with_framing(self.options.framing)
                        .with_info_probe(self.options.probe_info),
                )
            }
        };

        let verbose = self
            .options
            .verbose
            .unwrap_or_else(|| self.identity.has_admin_role());
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver::new(verbose)));

        let trace_id = uuid::Uuid::new_v4().to_string();
        let headers = Arc::new(self.identity.connect_headers(&trace_id));

        let relay = InboundRelay::new(self.options.relay_capacity.unwrap_or(INBOUND_RELAY_CAPACITY));
        let queue = OutboundQueue::new(
            self.options.max_queue_size.unwrap_or(MAX_OUTBOUND_QUEUE_SIZE),
            self.options.overflow_policy,
        );

        // Initialize state watcher channel
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let worker = SessionWorker::new(
            WorkerConfig {
                connect_options: ConnectOptions {
                    headers: (*headers).clone(),
                    heartbeat: self.options.heartbeat(),
                },
                backoff: self.options.backoff(),
                max_reconnect_attempts: self.options.max_reconnect_attempts,
                inbound_prefix: self.options.inbound_prefix.clone(),
                inbound_suffix: self.options.inbound_suffix.clone(),
            },
            transport,
            observer,
            relay.clone(),
            ClientState::new(queue, state_tx),
            commands_tx.downgrade(),
        );
        tokio::spawn(worker.run(commands_rx));

        tracing::debug!(
            endpoint = %self.endpoint,
            trace_id = %trace_id,
            verbose,
            "Session manager created"
        );

        Ok(SessionManager {
            commands: commands_tx,
            state_rx,
            relay,
            headers,
            trace_id: trace_id.into(),
            publish_destination: self.options.publish_destination.into(),
            verbose,
        })
    }
}
