use super::factory::{Framing, StompWebSocketTransport};
use super::sockjs::{self, SockJsFrame, WebScheme};
use super::stomp::{FrameBuffer, StompFrame, negotiate_heartbeat};
use super::{
    ConnectAck, ConnectOptions, FrameHandler, Subscription, TransportClient, TransportFailure,
    TransportListener,
};
use crate::infrastructure::TaskManager;
use crate::types::{JSON_CONTENT_TYPE, Result, SessionError, WS_CLOSE_NORMAL, stomp};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DISCONNECT_RECEIPT: &str = "disconnect-0";

/// How long a DISCONNECT waits for its RECEIPT before the socket is closed anyway
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outgoing {
    Frame(Vec<u8>),
    /// Send DISCONNECT and close once the server acknowledges it
    Disconnect,
}

/// State shared between the client handle and its connection task
#[derive(Default)]
struct Shared {
    outbound: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    subscriptions: Mutex<HashMap<String, FrameHandler>>,
    next_subscription: AtomicU64,
    tasks: Mutex<TaskManager>,
    activated: AtomicBool,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn send(&self, outgoing: Outgoing) -> Result<()> {
        let outbound = lock(&self.outbound);
        match outbound.as_ref() {
            Some(tx) => tx
                .send(outgoing)
                .map_err(|_| SessionError::SendFailure("connection closed".to_string())),
            None => Err(SessionError::SendFailure("not connected".to_string())),
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::SendFailure("not connected".to_string()))
        }
    }
}

/// STOMP client over one WebSocket connection.
///
/// Built by [`StompWebSocketTransport`]; activated at most once.
pub struct StompWebSocketClient {
    transport: StompWebSocketTransport,
    shared: Arc<Shared>,
}

impl StompWebSocketClient {
    pub fn new(transport: StompWebSocketTransport) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Checks if the STOMP session is established
    pub fn is_connected(&self) -> bool {
        self.shared.require_connected().is_ok()
    }
}

impl TransportClient for StompWebSocketClient {
    fn activate(
        &self,
        options: ConnectOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<()> {
        if self.shared.activated.swap(true, Ordering::SeqCst) {
            return Err(SessionError::ConnectFailure(
                "client was already activated".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.shared.outbound) = Some(tx);

        let connection = Connection {
            transport: self.transport.clone(),
            options,
            listener,
            shared: Arc::clone(&self.shared),
        };
        lock(&self.shared.tasks).spawn(connection.run(rx));
        Ok(())
    }

    fn deactivate(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.shared.connected.swap(false, Ordering::SeqCst) {
            // The connection task sends DISCONNECT and closes after the RECEIPT
            if self.shared.send(Outgoing::Disconnect).is_err() {
                lock(&self.shared.tasks).abort_all();
            }
        } else {
            lock(&self.shared.tasks).abort_all();
        }
        lock(&self.shared.subscriptions).clear();
    }

    fn publish(&self, destination: &str, body: Bytes) -> Result<()> {
        self.shared.require_connected()?;
        if self.transport.framing() == Framing::SockJs
            && let Err(e) = std::str::from_utf8(&body)
        {
            return Err(SessionError::InvalidPayload(format!(
                "SockJS framing carries text only: {}",
                e
            )));
        }
        let frame = StompFrame::send(destination, body, JSON_CONTENT_TYPE);
        self.shared.send(Outgoing::Frame(frame.encode()))
    }

    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<Box<dyn Subscription>> {
        self.shared.require_connected()?;
        let id = format!(
            "sub-{}",
            self.shared.next_subscription.fetch_add(1, Ordering::SeqCst)
        );
        lock(&self.shared.subscriptions).insert(id.clone(), handler);

        if let Err(e) = self
            .shared
            .send(Outgoing::Frame(StompFrame::subscribe(&id, destination).encode()))
        {
            lock(&self.shared.subscriptions).remove(&id);
            return Err(e);
        }

        tracing::debug!(id = %id, destination = %destination, "Subscribed");
        Ok(Box::new(WebSocketSubscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }))
    }
}

struct WebSocketSubscription {
    id: String,
    shared: Weak<Shared>,
}

impl Subscription for WebSocketSubscription {
    fn unsubscribe(self: Box<Self>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if lock(&shared.subscriptions).remove(&self.id).is_none() {
            return;
        }
        if shared.require_connected().is_ok()
            && let Err(e) = shared.send(Outgoing::Frame(StompFrame::unsubscribe(&self.id).encode()))
        {
            tracing::debug!(id = %self.id, "Could not send UNSUBSCRIBE: {}", e);
        }
    }
}

/// What the connection loop does after handling input
enum Flow {
    Continue,
    /// Exit; the listener has already been told
    Stop,
    /// Exit and report the connection as lost
    Lost(String),
    /// Close the socket normally and exit
    Close,
}

/// Per-connection protocol state
struct Link {
    session_id: String,
    connected: bool,
    send_every: Option<Duration>,
    expect_every: Option<Duration>,
    last_seen: Instant,
    heartbeat_changed: bool,
    frames: FrameBuffer,
    /// Set once DISCONNECT is sent
    receipt_deadline: Option<Instant>,
}

struct Connection {
    transport: StompWebSocketTransport,
    options: ConnectOptions,
    listener: Arc<dyn TransportListener>,
    shared: Arc<Shared>,
}

impl Connection {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<Outgoing>) {
        let mut link = Link {
            session_id: sockjs::session_id(),
            connected: false,
            send_every: None,
            expect_every: None,
            last_seen: Instant::now(),
            heartbeat_changed: false,
            frames: FrameBuffer::new(),
            receipt_deadline: None,
        };

        let mut ws = match self.open(&link.session_id).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!("WebSocket connect failed: {}", e);
                self.lost(false, e.to_string());
                self.finish();
                return;
            }
        };
        tracing::info!("WebSocket open to {}", self.transport.endpoint());

        if self.transport.framing() == Framing::Raw
            && let Flow::Lost(reason) = self.send_wire(&mut ws, self.connect_frame()).await
        {
            self.lost(false, reason);
            self.finish();
            return;
        }

        let mut heartbeat = idle_interval();
        loop {
            let flow = tokio::select! {
                incoming = ws.next() => match incoming {
                    Some(Ok(message)) => {
                        link.last_seen = Instant::now();
                        self.handle_message(message, &mut link, &mut ws).await
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket read error: {}", e);
                        Flow::Lost(e.to_string())
                    }
                    None => Flow::Lost("connection closed".to_string()),
                },
                outgoing = outbound.recv(), if link.receipt_deadline.is_none() => match outgoing {
                    Some(Outgoing::Frame(wire)) => self.send_wire(&mut ws, wire).await,
                    Some(Outgoing::Disconnect) => {
                        link.receipt_deadline = Some(Instant::now() + RECEIPT_TIMEOUT);
                        let disconnect = StompFrame::disconnect(DISCONNECT_RECEIPT).encode();
                        match self.send_wire(&mut ws, disconnect).await {
                            Flow::Continue => Flow::Continue,
                            _ => Flow::Close,
                        }
                    }
                    None => Flow::Close,
                },
                _ = time::sleep_until(link.receipt_deadline.unwrap_or_else(Instant::now)),
                    if link.receipt_deadline.is_some() =>
                {
                    tracing::debug!("No RECEIPT for DISCONNECT, closing");
                    Flow::Close
                }
                _ = heartbeat.tick(), if link.send_every.is_some() || link.expect_every.is_some() => {
                    self.heartbeat(&link, &mut ws).await
                }
            };

            match flow {
                Flow::Continue => {}
                Flow::Stop => break,
                Flow::Close => {
                    let close = CloseFrame {
                        code: CloseCode::from(WS_CLOSE_NORMAL),
                        reason: Default::default(),
                    };
                    if let Err(e) = ws.close(Some(close)).await {
                        tracing::debug!("WebSocket close failed: {}", e);
                    }
                    break;
                }
                Flow::Lost(reason) => {
                    tracing::warn!("Connection lost: {}", reason);
                    self.lost(link.connected, reason);
                    break;
                }
            }

            if link.heartbeat_changed {
                link.heartbeat_changed = false;
                heartbeat = heartbeat_interval(&link);
            }
        }

        self.finish();
        tracing::info!("Connection task finished");
    }

    async fn open(&self, session_id: &str) -> Result<WsStream> {
        let endpoint = self.transport.endpoint();
        let url = match self.transport.framing() {
            Framing::SockJs => {
                if self.transport.probes_info() {
                    sockjs::probe_info(endpoint).await?;
                }
                sockjs::websocket_url(endpoint, &sockjs::server_id(), session_id)?
            }
            Framing::Raw => sockjs::to_scheme(endpoint, WebScheme::WebSocket)?,
        };

        let mut request = url.as_str().into_client_request()?;
        for (name, value) in &self.options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SessionError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| SessionError::InvalidHeader(name.clone()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        tracing::debug!("Connecting to {}", url);
        let (ws, _response) = connect_async(request).await?;
        Ok(ws)
    }

    fn connect_frame(&self) -> Vec<u8> {
        let host = self.transport.endpoint().host_str().unwrap_or("localhost");
        StompFrame::connect(host, &self.options.headers, self.options.heartbeat).encode()
    }

    /// Wrap STOMP wire bytes for the configured framing
    fn wrap(&self, wire: Vec<u8>) -> Result<Message> {
        match self.transport.framing() {
            Framing::Raw => Ok(match String::from_utf8(wire) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => Message::Binary(Bytes::from(e.into_bytes())),
            }),
            Framing::SockJs => {
                let text = String::from_utf8(wire)
                    .map_err(|e| SessionError::InvalidPayload(e.to_string()))?;
                Ok(Message::Text(sockjs::encode(&[text.as_str()]).into()))
            }
        }
    }

    async fn send_wire(&self, ws: &mut WsStream, wire: Vec<u8>) -> Flow {
        let message = match self.wrap(wire) {
            Ok(message) => message,
            Err(e) => return Flow::Lost(e.to_string()),
        };
        match ws.send(message).await {
            Ok(()) => Flow::Continue,
            Err(e) => Flow::Lost(e.to_string()),
        }
    }

    async fn handle_message(&self, message: Message, link: &mut Link, ws: &mut WsStream) -> Flow {
        match message {
            Message::Text(text) => match self.transport.framing() {
                Framing::Raw => self.handle_stomp(text.as_bytes(), link),
                Framing::SockJs => match sockjs::decode(text.as_str()) {
                    Ok(SockJsFrame::Open) => self.send_wire(ws, self.connect_frame()).await,
                    Ok(SockJsFrame::Heartbeat) => Flow::Continue,
                    Ok(SockJsFrame::Messages(batch)) => {
                        for payload in batch {
                            match self.handle_stomp(payload.as_bytes(), link) {
                                Flow::Continue => {}
                                other => return other,
                            }
                        }
                        Flow::Continue
                    }
                    Ok(SockJsFrame::Close { code, reason }) => {
                        Flow::Lost(format!("SockJS close {}: {}", code, reason))
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring SockJS frame: {}", e);
                        Flow::Continue
                    }
                },
            },
            Message::Binary(data) => self.handle_stomp(&data, link),
            Message::Close(frame) => match frame {
                Some(close_frame) => Flow::Lost(format!(
                    "server closed connection: code={:?}, reason='{}'",
                    close_frame.code, close_frame.reason
                )),
                None => Flow::Lost("server closed connection without close frame".to_string()),
            },
            Message::Ping(data) => {
                tracing::trace!("Received ping ({} bytes)", data.len());
                Flow::Continue
            }
            Message::Pong(data) => {
                tracing::trace!("Received pong ({} bytes)", data.len());
                Flow::Continue
            }
            Message::Frame(_) => Flow::Continue,
        }
    }

    fn handle_stomp(&self, wire: &[u8], link: &mut Link) -> Flow {
        let frames = match link.frames.push(wire) {
            Ok(frames) => frames,
            Err(e) => return Flow::Lost(format!("undecodable STOMP data: {}", e)),
        };

        for frame in frames {
            match frame.command.as_str() {
                stomp::CONNECTED => {
                    let (send_every, expect_every) = negotiate_heartbeat(
                        self.options.heartbeat,
                        frame.header(stomp::HEADER_HEART_BEAT),
                    );
                    link.connected = true;
                    link.send_every = send_every;
                    link.expect_every = expect_every;
                    link.heartbeat_changed = true;

                    let session_id = match self.transport.framing() {
                        Framing::SockJs => link.session_id.clone(),
                        Framing::Raw => frame
                            .header(stomp::HEADER_SESSION)
                            .map(str::to_string)
                            .unwrap_or_else(|| link.session_id.clone()),
                    };
                    self.shared.connected.store(true, Ordering::SeqCst);
                    tracing::debug!(
                        session_id = %session_id,
                        send_every = ?send_every,
                        expect_every = ?expect_every,
                        "STOMP session established"
                    );
                    if !self.shared.closed.load(Ordering::SeqCst) {
                        self.listener.on_connect(ConnectAck {
                            session_id,
                            version: frame.header("version").map(str::to_string),
                        });
                    }
                }
                stomp::MESSAGE => {
                    let handler = frame
                        .header(stomp::HEADER_SUBSCRIPTION)
                        .and_then(|id| lock(&self.shared.subscriptions).get(id).cloned());
                    match handler {
                        Some(handler) => handler(frame.body),
                        None => tracing::debug!(
                            subscription = frame.header(stomp::HEADER_SUBSCRIPTION).unwrap_or(""),
                            "Dropping MESSAGE for unknown subscription"
                        ),
                    }
                }
                stomp::ERROR => {
                    let message = frame
                        .header(stomp::HEADER_MESSAGE)
                        .unwrap_or("unknown error")
                        .to_string();
                    let details = String::from_utf8_lossy(&frame.body).into_owned();
                    tracing::error!("Error: {}", message);
                    tracing::error!("Additional details: {}", details);
                    if !self.shared.closed.load(Ordering::SeqCst) {
                        self.listener
                            .on_error(TransportFailure::Protocol { message, details });
                    }
                    return Flow::Stop;
                }
                stomp::RECEIPT => {
                    if frame.header(stomp::HEADER_RECEIPT_ID) == Some(DISCONNECT_RECEIPT) {
                        return Flow::Close;
                    }
                }
                other => tracing::debug!("Ignoring STOMP frame {}", other),
            }
        }
        Flow::Continue
    }

    async fn heartbeat(&self, link: &Link, ws: &mut WsStream) -> Flow {
        if let Some(expect_every) = link.expect_every
            && link.last_seen.elapsed() > expect_every * 2
        {
            return Flow::Lost(format!(
                "no data from server for {:?}",
                link.last_seen.elapsed()
            ));
        }

        if link.send_every.is_some() {
            let beat = match self.transport.framing() {
                Framing::Raw => Message::Text("\n".into()),
                Framing::SockJs => Message::Text(sockjs::encode(&["\n"]).into()),
            };
            if let Err(e) = ws.send(beat).await {
                return Flow::Lost(e.to_string());
            }
        }
        Flow::Continue
    }

    /// Report a lost connection unless we were deactivated
    fn lost(&self, was_connected: bool, reason: String) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        if was_connected {
            self.listener.on_disconnect();
        } else {
            self.listener.on_error(TransportFailure::Connect(reason));
        }
    }

    fn finish(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        *lock(&self.shared.outbound) = None;
    }
}

/// Placeholder interval until heart-beats are negotiated
fn idle_interval() -> Interval {
    let period = Duration::from_secs(3600);
    time::interval_at(Instant::now() + period, period)
}

fn heartbeat_interval(link: &Link) -> Interval {
    let period = match (link.send_every, link.expect_every) {
        (Some(send), Some(expect)) => send.min(expect),
        (Some(period), None) | (None, Some(period)) => period,
        (None, None) => return idle_interval(),
    };
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    interval
}
