//! Scripted in-memory transport for driving the session manager in tests.

use super::{
    ConnectAck, ConnectOptions, FrameHandler, Subscription, TransportClient, TransportFactory,
    TransportFailure, TransportListener,
};
use crate::types::{OutboundMessage, Result, SessionError};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

type SubscriptionMap = Arc<Mutex<HashMap<u64, (String, FrameHandler)>>>;

#[derive(Default)]
struct Shared {
    clients: Mutex<Vec<Arc<MockClient>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    auto_accept: AtomicBool,
    fail_activate: AtomicBool,
    fail_subscribe: AtomicBool,
    text_only: AtomicBool,
    publish_delay: Mutex<Option<Duration>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every activation immediately reports CONNECTED with `sess-{n}`
    pub fn auto_accept(self) -> Self {
        self.shared.auto_accept.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_activate(&self, fail: bool) {
        self.shared.fail_activate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.shared.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Refuse non-UTF-8 bodies with `InvalidPayload`, as text-only framing does
    pub fn set_text_only(&self, text_only: bool) {
        self.shared.text_only.store(text_only, Ordering::SeqCst);
    }

    /// Make every publish block the calling thread
    pub fn set_publish_delay(&self, delay: Duration) {
        *self.shared.publish_delay.lock().unwrap() = Some(delay);
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.shared.clients.lock().unwrap().clone()
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.lock().unwrap().len()
    }

    pub fn last_client(&self) -> Arc<MockClient> {
        self.clients().last().cloned().expect("no client created")
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|m| String::from_utf8_lossy(&m.body).into_owned())
            .collect()
    }

    /// Subscriptions still held across all clients
    pub fn active_subscriptions(&self) -> usize {
        self.clients()
            .iter()
            .map(|client| client.active_subscriptions())
            .sum()
    }

    /// Clients that are connected and not torn down
    pub fn live_clients(&self) -> usize {
        self.clients().iter().filter(|c| c.is_live()).count()
    }
}

impl TransportFactory for MockTransport {
    fn create(&self) -> Arc<dyn TransportClient> {
        let mut clients = self.shared.clients.lock().unwrap();
        let client = Arc::new(MockClient {
            index: clients.len() + 1,
            transport: Arc::downgrade(&self.shared),
            listener: Mutex::new(None),
            options: Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            deactivated: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
        });
        clients.push(Arc::clone(&client));
        client
    }
}

pub(crate) struct MockClient {
    index: usize,
    transport: Weak<Shared>,
    listener: Mutex<Option<Arc<dyn TransportListener>>>,
    options: Mutex<Option<ConnectOptions>>,
    subscriptions: SubscriptionMap,
    next_subscription: AtomicU64,
    connected: AtomicBool,
    deactivated: AtomicBool,
    fail_publish: AtomicBool,
}

impl MockClient {
    fn listener(&self) -> Arc<dyn TransportListener> {
        self.listener
            .lock()
            .unwrap()
            .clone()
            .expect("client not activated")
    }

    pub fn session_id(&self) -> String {
        format!("sess-{}", self.index)
    }

    pub fn accept(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.listener().on_connect(ConnectAck {
            session_id: self.session_id(),
            version: Some("1.2".to_string()),
        });
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.listener().on_disconnect();
    }

    pub fn refuse(&self, reason: &str) {
        self.listener()
            .on_error(TransportFailure::Connect(reason.to_string()));
    }

    pub fn server_error(&self, message: &str, details: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.listener().on_error(TransportFailure::Protocol {
            message: message.to_string(),
            details: details.to_string(),
        });
    }

    /// Deliver a frame to every subscription on this client
    pub fn deliver(&self, body: &'static str) {
        let handlers: Vec<FrameHandler> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(Bytes::from_static(body.as_bytes()));
        }
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn subscribed_destinations(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|(destination, _)| destination.clone())
            .collect()
    }

    pub fn connect_options(&self) -> Option<ConnectOptions> {
        self.options.lock().unwrap().clone()
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.is_deactivated()
    }
}

impl TransportClient for MockClient {
    fn activate(&self, options: ConnectOptions, listener: Arc<dyn TransportListener>) -> Result<()> {
        let transport = self.transport.upgrade();
        if transport
            .as_ref()
            .is_some_and(|t| t.fail_activate.load(Ordering::SeqCst))
        {
            return Err(SessionError::ConnectFailure("activation refused".to_string()));
        }

        *self.options.lock().unwrap() = Some(options);
        *self.listener.lock().unwrap() = Some(listener);

        if transport.is_some_and(|t| t.auto_accept.load(Ordering::SeqCst)) {
            self.accept();
        }
        Ok(())
    }

    fn deactivate(&self) {
        self.deactivated.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn publish(&self, destination: &str, body: Bytes) -> Result<()> {
        let Some(transport) = self.transport.upgrade() else {
            return Err(SessionError::SendFailure("transport dropped".to_string()));
        };
        if let Some(delay) = *transport.publish_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        if !self.is_live() {
            return Err(SessionError::SendFailure("not connected".to_string()));
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(SessionError::SendFailure("injected failure".to_string()));
        }
        if transport.text_only.load(Ordering::SeqCst) && std::str::from_utf8(&body).is_err() {
            return Err(SessionError::InvalidPayload("body is not UTF-8".to_string()));
        }
        transport
            .sent
            .lock()
            .unwrap()
            .push(OutboundMessage::new(destination, body));
        Ok(())
    }

    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<Box<dyn Subscription>> {
        if !self.is_live() {
            return Err(SessionError::SendFailure("not connected".to_string()));
        }
        if self
            .transport
            .upgrade()
            .is_some_and(|t| t.fail_subscribe.load(Ordering::SeqCst))
        {
            return Err(SessionError::SendFailure("subscribe refused".to_string()));
        }
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, (destination.to_string(), handler));
        Ok(Box::new(MockSubscription {
            id,
            subscriptions: Arc::clone(&self.subscriptions),
        }))
    }
}

struct MockSubscription {
    id: u64,
    subscriptions: SubscriptionMap,
}

impl Subscription for MockSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.subscriptions.lock().unwrap().remove(&self.id);
    }
}
