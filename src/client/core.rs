use super::worker::Command;
use super::{ClientIdentity, ConnectionState, SessionManagerBuilder, SessionSnapshot};
use crate::messaging::{InboundMessages, InboundRelay};
use crate::transport::Headers;
use crate::types::{OutboundMessage, Result, SessionError};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// A resilient chat session that survives transport failures.
///
/// `SessionManager` is a cheap, cloneable handle to a single worker task. The
/// worker owns the connection, the outbound queue and the reconnect timer.
/// Payloads published while disconnected are queued and delivered in order on
/// the next successful connect. Dropped connections are retried with
/// exponential backoff until [`disconnect()`](Self::disconnect) is called.
///
/// # Example
///
/// ```no_run
/// use chat_session_rs::{ClientIdentity, SessionManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = SessionManager::new(
///     "https://chat.example.com/api/search/chat",
///     ClientIdentity::new("user-1").with_roles(["Viewer"]),
/// )?;
///
/// manager.connect(None).await?;
/// manager.publish(&serde_json::json!({ "question": "hello" }))?;
/// // ...
/// manager.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state_rx: watch::Receiver<ConnectionState>,
    pub(crate) relay: InboundRelay,
    pub(crate) headers: Arc<Headers>,
    pub(crate) trace_id: Arc<str>,
    pub(crate) publish_destination: Arc<str>,
    pub(crate) verbose: bool,
}

impl SessionManager {
    /// Creates a manager with default options and the STOMP WebSocket transport.
    ///
    /// No connection is made until [`connect()`](Self::connect) is called.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the identity has no user id
    /// and [`SessionError::UrlParse`] if the endpoint cannot be parsed.
    pub fn new(endpoint: impl Into<String>, identity: ClientIdentity) -> Result<Self> {
        SessionManagerBuilder::new(endpoint, identity).build()
    }

    pub fn builder(endpoint: impl Into<String>, identity: ClientIdentity) -> SessionManagerBuilder {
        SessionManagerBuilder::new(endpoint, identity)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Starts a session.
    ///
    /// Resolves once the worker has started the attempt, not when the session is
    /// established; use [`wait_for_connection()`](Self::wait_for_connection) or
    /// [`state_changes()`](Self::state_changes) for that. `initial` is published
    /// once, after any queued payloads, on the first successful connect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyConnected`] if a session is connecting or
    /// connected. The initial payload is not queued in that case.
    pub async fn connect(&self, initial: Option<OutboundMessage>) -> Result<()> {
        self.request(|reply| Command::Connect { initial, reply }).await?
    }

    /// Like [`connect()`](Self::connect) with a JSON initial payload for the
    /// publish destination
    pub async fn connect_with<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let initial = OutboundMessage::json(self.publish_destination.as_ref(), payload)?;
        self.connect(Some(initial)).await
    }

    /// Publishes a JSON payload to the publish destination. Never blocks.
    pub fn publish<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        self.publish_message(OutboundMessage::json(
            self.publish_destination.as_ref(),
            payload,
        )?)
    }

    /// Publishes raw bytes to the publish destination
    pub fn publish_bytes(&self, body: impl Into<Bytes>) -> Result<()> {
        self.publish_message(self.message(body))
    }

    pub fn publish_to(&self, destination: impl Into<String>, body: impl Into<Bytes>) -> Result<()> {
        self.publish_message(OutboundMessage::new(destination, body))
    }

    pub fn publish_message(&self, message: OutboundMessage) -> Result<()> {
        self.send(Command::Publish(message))
    }

    /// An outbound message for the publish destination
    pub fn message(&self, body: impl Into<Bytes>) -> OutboundMessage {
        OutboundMessage::new(self.publish_destination.as_ref(), body)
    }

    /// Ends the session and stops reconnecting. Calling it again is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// A new listener for inbound messages. Earlier messages are not replayed.
    pub fn messages(&self) -> InboundMessages {
        self.relay.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Waits until the session is connected.
    ///
    /// # Errors
    ///
    /// [`SessionError::Abandoned`] if reconnecting gave up first, and
    /// [`SessionError::Closed`] if the worker stopped.
    pub async fn wait_for_connection(&self) -> Result<()> {
        let mut rx = self.state_rx.clone();
        let state = *rx
            .wait_for(|state| {
                matches!(state, ConnectionState::Connected | ConnectionState::Abandoned)
            })
            .await
            .map_err(|_| SessionError::Closed)?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ => {
                let attempts = self.snapshot().await?.attempts;
                Err(SessionError::Abandoned(attempts))
            }
        }
    }

    /// Headers sent on every connect
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn publish_destination(&self) -> &str {
        &self.publish_destination
    }

    /// Whether message-level events are logged at `info`
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SessionOptions;
    use crate::infrastructure::{FailureKind, SessionEvent, SessionObserver};
    use crate::messaging::OverflowPolicy;
    use crate::transport::HeartbeatConfig;
    use crate::transport::mock::MockTransport;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingObserver {
        fn count(&self, matcher: impl Fn(&SessionEvent) -> bool) -> usize {
            self.events.lock().unwrap().iter().filter(|e| matcher(e)).count()
        }
    }

    fn manager_with(transport: &MockTransport, options: SessionOptions) -> SessionManager {
        SessionManager::builder("", ClientIdentity::new("u1"))
            .transport(Arc::new(transport.clone()))
            .options(options)
            .build()
            .unwrap()
    }

    fn manager(transport: &MockTransport) -> SessionManager {
        manager_with(transport, SessionOptions::default())
    }

    /// Round-trip the worker so every earlier command has been handled
    async fn settle(manager: &SessionManager) -> SessionSnapshot {
        manager.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_sends_initial() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);

        manager.connect(Some(manager.message("hello"))).await.unwrap();
        let snapshot = settle(&manager).await;

        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.session_id.unwrap().as_str(), "sess-1");
        assert!(manager.is_connected());
        assert_eq!(
            transport.last_client().subscribed_destinations(),
            vec!["/user/sess-1/queue/messages".to_string()]
        );
        assert_eq!(transport.sent_bodies(), vec!["hello"]);
        assert_eq!(transport.sent()[0].destination, "/app/chatbot");
    }

    #[tokio::test]
    async fn test_connect_options_carry_headers_and_heartbeat() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        let options = transport.last_client().connect_options().unwrap();
        assert_eq!(options.heartbeat, HeartbeatConfig::default());
        assert_eq!(options.headers["LOGIN_USER_ID"], "u1");
        assert_eq!(&options.headers, manager.headers());
    }

    #[tokio::test]
    async fn test_queued_payloads_drain_before_initial() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.publish_bytes("A").unwrap();
        manager.publish_bytes("B").unwrap();
        assert_eq!(settle(&manager).await.queued, 2);
        assert!(transport.sent().is_empty());

        manager.connect(Some(manager.message("I"))).await.unwrap();
        transport.last_client().accept();
        let snapshot = settle(&manager).await;

        assert_eq!(transport.sent_bodies(), vec!["A", "B", "I"]);
        assert_eq!(snapshot.queued, 0);
        assert!(!snapshot.initial_pending);
    }

    #[tokio::test]
    async fn test_publish_json_payload() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();

        manager.publish(&serde_json::json!({ "q": 1 })).unwrap();
        manager.publish_to("/app/other", "raw").unwrap();
        settle(&manager).await;

        let sent = transport.sent();
        assert_eq!(sent[0].body, r#"{"q":1}"#);
        assert_eq!(sent[1].destination, "/app/other");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_across_reconnect_and_initial_sent_once() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(Some(manager.message("I"))).await.unwrap();
        transport.last_client().accept();
        settle(&manager).await;
        transport.last_client().drop_connection();

        manager.publish_bytes("C").unwrap();
        manager.publish_bytes("D").unwrap();
        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.queued, 2);
        assert_eq!(snapshot.reconnect_delay, Some(Duration::from_millis(2000)));

        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle(&manager).await;
        assert_eq!(transport.client_count(), 2);

        transport.last_client().accept();
        settle(&manager).await;

        assert_eq!(transport.sent_bodies(), vec!["I", "C", "D"]);
        assert_eq!(
            transport.last_client().subscribed_destinations(),
            vec!["/user/sess-2/queue/messages".to_string()]
        );
    }

    #[tokio::test]
    async fn test_duplicate_connect_is_rejected() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(None).await.unwrap();
        let result = manager.connect(Some(manager.message("x"))).await;
        assert!(matches!(result, Err(SessionError::AlreadyConnected)));

        transport.last_client().accept();
        assert!(matches!(
            manager.connect(None).await,
            Err(SessionError::AlreadyConnected)
        ));

        let snapshot = settle(&manager).await;
        assert_eq!(transport.client_count(), 1);
        assert_eq!(snapshot.queued, 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let transport = MockTransport::new().auto_accept();
        let observer = Arc::new(RecordingObserver::default());
        let manager = SessionManager::builder("", ClientIdentity::new("u1"))
            .transport(Arc::new(transport.clone()))
            .observer(observer.clone())
            .build()
            .unwrap();

        manager.connect(None).await.unwrap();
        settle(&manager).await;
        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            observer.count(|e| matches!(e, SessionEvent::Disconnected { manual: true })),
            1
        );
        assert_eq!(transport.live_clients(), 0);
        assert_eq!(transport.active_subscriptions(), 0);

        // No auto-reconnect after a manual disconnect
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle(&manager).await;
        assert_eq!(transport.client_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(None).await.unwrap();
        transport.last_client().refuse("unreachable");
        assert!(settle(&manager).await.reconnect_pending);

        manager.disconnect().await.unwrap();
        assert!(!settle(&manager).await.reconnect_pending);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle(&manager).await;
        assert_eq!(transport.client_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_counter_resets_on_connect() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(None).await.unwrap();
        transport.last_client().refuse("down");
        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.reconnect_delay, Some(Duration::from_millis(2000)));

        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle(&manager).await;
        transport.last_client().refuse("still down");
        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.reconnect_delay, Some(Duration::from_millis(4000)));

        tokio::time::sleep(Duration::from_millis(4001)).await;
        settle(&manager).await;
        transport.last_client().accept();
        assert_eq!(settle(&manager).await.attempts, 0);

        transport.last_client().drop_connection();
        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.reconnect_delay, Some(Duration::from_millis(2000)));
        assert_eq!(transport.client_count(), 3);
    }

    #[tokio::test]
    async fn test_send_failure_requeues_and_backs_off() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        transport.last_client().set_fail_publish(true);
        manager.publish_bytes("B").unwrap();
        let snapshot = settle(&manager).await;

        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.queued, 1);
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.reconnect_delay, Some(Duration::from_millis(2000)));
        assert!(transport.sent().is_empty());
        assert_eq!(transport.active_subscriptions(), 0);
    }

    fn observed_manager(transport: &MockTransport) -> (SessionManager, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let manager = SessionManager::builder("", ClientIdentity::new("u1"))
            .transport(Arc::new(transport.clone()))
            .observer(observer.clone())
            .build()
            .unwrap();
        (manager, observer)
    }

    #[tokio::test]
    async fn test_uncarriable_payload_is_dropped_without_reconnect() {
        let transport = MockTransport::new().auto_accept();
        transport.set_text_only(true);
        let (manager, observer) = observed_manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        manager.publish_bytes(vec![0xff, 0xfe]).unwrap();
        manager.publish_bytes("after").unwrap();
        let snapshot = settle(&manager).await;

        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.queued, 0);
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(transport.sent_bodies(), vec!["after"]);
        assert_eq!(transport.client_count(), 1);
        assert_eq!(
            observer.count(|e| matches!(e, SessionEvent::PublishRejected { .. })),
            1
        );
        assert_eq!(observer.count(|e| matches!(e, SessionEvent::Error { .. })), 0);
    }

    #[tokio::test]
    async fn test_uncarriable_queued_payload_does_not_block_drain() {
        let transport = MockTransport::new();
        transport.set_text_only(true);
        let (manager, observer) = observed_manager(&transport);

        manager.publish_bytes("A").unwrap();
        manager.publish_bytes(vec![0xc3, 0x28]).unwrap();
        manager.publish_bytes("B").unwrap();
        manager.connect(Some(manager.message("I"))).await.unwrap();
        transport.last_client().accept();
        let snapshot = settle(&manager).await;

        assert_eq!(transport.sent_bodies(), vec!["A", "B", "I"]);
        assert_eq!(snapshot.queued, 0);
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(
            observer.count(|e| matches!(e, SessionEvent::PublishRejected { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_inbound_subscribe_is_a_connect_failure() {
        let transport = MockTransport::new().auto_accept();
        transport.set_fail_subscribe(true);
        let (manager, observer) = observed_manager(&transport);

        manager.connect(None).await.unwrap();
        let snapshot = settle(&manager).await;

        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.attempts, 1);
        assert!(snapshot.reconnect_pending);
        assert_eq!(
            observer.count(|e| matches!(
                e,
                SessionEvent::Error {
                    kind: FailureKind::Connect,
                    ..
                }
            )),
            1
        );
        assert_eq!(
            observer.count(|e| matches!(
                e,
                SessionEvent::Error {
                    kind: FailureKind::Send,
                    ..
                }
            )),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_live_session_across_reconnects() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(None).await.unwrap();
        for _ in 0..3 {
            transport.last_client().accept();
            settle(&manager).await;
            assert_eq!(transport.live_clients(), 1);
            transport.last_client().server_error("boom", "details");
            settle(&manager).await;
            assert_eq!(transport.live_clients(), 0);
            tokio::time::sleep(Duration::from_millis(2001)).await;
            settle(&manager).await;
        }
        assert_eq!(transport.client_count(), 4);
        assert_eq!(
            transport.clients().iter().filter(|c| !c.is_deactivated()).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_then_immediate_connect_keeps_one_subscription() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        transport.last_client().drop_connection();
        manager.connect(None).await.unwrap();
        let snapshot = settle(&manager).await;

        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert!(!snapshot.reconnect_pending);
        assert_eq!(transport.active_subscriptions(), 1);

        // The cancelled reconnect never fires
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle(&manager).await;
        assert_eq!(transport.client_count(), 2);
        assert_eq!(transport.live_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_session_messages_are_dropped() {
        let transport = MockTransport::new();
        let manager = manager(&transport);
        let mut inbound = manager.messages();

        manager.connect(None).await.unwrap();
        let first = transport.last_client();
        first.accept();
        settle(&manager).await;
        first.drop_connection();
        settle(&manager).await;
        first.deliver("stale");

        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle(&manager).await;
        transport.last_client().accept();
        settle(&manager).await;
        transport.last_client().deliver("fresh");
        settle(&manager).await;

        assert_eq!(inbound.try_recv(), Some(Bytes::from("fresh")));
        assert_eq!(inbound.try_recv(), None);
    }

    #[tokio::test]
    async fn test_inbound_messages_reach_every_listener() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);

        // Nobody listening yet: dropped without error
        manager.connect(None).await.unwrap();
        settle(&manager).await;
        transport.last_client().deliver("early");
        settle(&manager).await;

        let mut first = manager.messages();
        let mut second = manager.messages();
        transport.last_client().deliver("hello");
        settle(&manager).await;

        assert_eq!(first.recv().await, Some(Bytes::from("hello")));
        assert_eq!(second.recv().await, Some(Bytes::from("hello")));
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_after_max_attempts() {
        let transport = MockTransport::new();
        let manager = manager_with(
            &transport,
            SessionOptions {
                max_reconnect_attempts: Some(1),
                ..Default::default()
            },
        );

        manager.connect(None).await.unwrap();
        transport.last_client().refuse("down");
        settle(&manager).await;
        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle(&manager).await;
        transport.last_client().refuse("down");

        let result = manager.wait_for_connection().await;
        assert!(matches!(result, Err(SessionError::Abandoned(2))));
        assert_eq!(manager.state(), ConnectionState::Abandoned);

        manager.connect(None).await.unwrap();
        assert_eq!(settle(&manager).await.attempts, 0);
        transport.last_client().accept();
        manager.wait_for_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_moves_unsent_initial_to_queue() {
        let transport = MockTransport::new();
        let manager = manager(&transport);

        manager.connect(Some(manager.message("I"))).await.unwrap();
        assert!(settle(&manager).await.initial_pending);
        manager.disconnect().await.unwrap();

        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.queued, 1);
        assert!(!snapshot.initial_pending);

        manager.connect(None).await.unwrap();
        transport.last_client().accept();
        settle(&manager).await;
        assert_eq!(transport.sent_bodies(), vec!["I"]);
    }

    #[tokio::test]
    async fn test_activation_failure_schedules_reconnect() {
        let transport = MockTransport::new();
        transport.set_fail_activate(true);
        let manager = manager(&transport);

        manager.connect(None).await.unwrap();
        let snapshot = settle(&manager).await;
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
        assert_eq!(snapshot.attempts, 1);
        assert!(snapshot.reconnect_pending);
    }

    #[tokio::test]
    async fn test_queue_overflow_policies() {
        let transport = MockTransport::new();
        let observer = Arc::new(RecordingObserver::default());
        let manager = SessionManager::builder("", ClientIdentity::new("u1"))
            .transport(Arc::new(transport.clone()))
            .observer(observer.clone())
            .options(SessionOptions {
                max_queue_size: Some(2),
                overflow_policy: OverflowPolicy::DropOldest,
                ..Default::default()
            })
            .build()
            .unwrap();

        for body in ["A", "B", "C"] {
            manager.publish_bytes(body).unwrap();
        }
        assert_eq!(settle(&manager).await.queued, 2);
        assert_eq!(
            observer.count(|e| matches!(e, SessionEvent::QueueOverflow { rejected: false, .. })),
            1
        );

        manager.connect(None).await.unwrap();
        transport.last_client().accept();
        settle(&manager).await;
        assert_eq!(transport.sent_bodies(), vec!["B", "C"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_does_not_block_on_transport() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        transport.set_publish_delay(Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..5 {
            manager.publish_bytes("slow").unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));

        settle(&manager).await;
        assert_eq!(transport.sent().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_when_handles_dropped() {
        let transport = MockTransport::new().auto_accept();
        let manager = manager(&transport);
        manager.connect(None).await.unwrap();
        settle(&manager).await;

        let inbound = manager.messages();
        drop(manager);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(transport.last_client().is_deactivated());
        drop(inbound);
    }
}
