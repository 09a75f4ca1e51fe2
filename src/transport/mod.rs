//! Transport collaborator seam.
//!
//! A [`TransportFactory`] builds one [`TransportClient`] per connection attempt.
//! Clients report lifecycle through a [`TransportListener`] and deliver frames
//! for a subscription through its [`FrameHandler`]. All methods return without
//! waiting on the network.

// Module declarations
mod factory;
#[cfg(test)]
pub(crate) mod mock;
pub mod sockjs;
pub mod stomp;
mod websocket;

// Public API exports
pub use factory::{Framing, StompWebSocketTransport};
pub use websocket::StompWebSocketClient;

use crate::types::Result;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Connect-time headers, iterated in key order
pub type Headers = BTreeMap<String, String>;

/// Callback for frames arriving on one subscription
pub type FrameHandler = Arc<dyn Fn(Bytes) + Send + Sync + 'static>;

/// Heartbeat cadence requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often we promise to send; zero disables
    pub outgoing: Duration,
    /// How often we want to hear from the server; zero disables
    pub incoming: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: Duration::from_millis(crate::types::HEARTBEAT_OUTGOING),
            incoming: Duration::from_millis(crate::types::HEARTBEAT_INCOMING),
        }
    }
}

/// Everything a transport needs to establish a session
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub headers: Headers,
    pub heartbeat: HeartbeatConfig,
}

/// Connect acknowledgment carrying the session identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAck {
    pub session_id: String,
    /// Protocol version the server agreed on, if reported
    pub version: Option<String>,
}

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The session could not be established
    Connect(String),
    /// The server sent an error frame
    Protocol { message: String, details: String },
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(reason) => write!(f, "connect failed: {}", reason),
            Self::Protocol { message, .. } => write!(f, "server error: {}", message),
        }
    }
}

/// Lifecycle callbacks, invoked from the transport's own tasks
pub trait TransportListener: Send + Sync {
    fn on_connect(&self, ack: ConnectAck);
    fn on_disconnect(&self);
    fn on_error(&self, failure: TransportFailure);
}

/// Handle releasing one subscription
pub trait Subscription: Send {
    fn unsubscribe(self: Box<Self>);
}

/// One transport connection instance
pub trait TransportClient: Send + Sync {
    /// Begin connecting; completion is reported through `listener`
    fn activate(&self, options: ConnectOptions, listener: Arc<dyn TransportListener>)
    -> Result<()>;

    /// Begin graceful teardown. No listener callbacks are owed afterwards.
    fn deactivate(&self);

    /// Hand `body` to the transport for `destination`
    fn publish(&self, destination: &str, body: Bytes) -> Result<()>;

    /// Route frames for `destination` to `handler` until the handle is released
    fn subscribe(&self, destination: &str, handler: FrameHandler) -> Result<Box<dyn Subscription>>;
}

/// Builds a fresh client for every connection attempt
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn TransportClient>;
}
