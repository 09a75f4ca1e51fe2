//! # Chat Session
//!
//! A resilient client session for a STOMP chat backend, with SockJS or raw
//! WebSocket framing.
//!
//! Payloads published while offline are queued and delivered in order once the
//! session is (re)established. Dropped connections are retried with capped
//! exponential backoff. Inbound messages fan out to any number of listeners.
//!
//! ## Example
//!
//! ```no_run
//! use chat_session_rs::{ClientIdentity, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SessionManager::new(
//!         "https://chat.example.com/api/search/chat",
//!         ClientIdentity::new("user-1").with_call_type("chat"),
//!     )?;
//!
//!     let mut inbound = manager.messages();
//!     manager.connect_with(&serde_json::json!({ "question": "hello" })).await?;
//!
//!     while let Some(body) = inbound.recv().await {
//!         println!("{}", String::from_utf8_lossy(&body));
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{
    ClientIdentity, ConnectionState, SessionManager, SessionManagerBuilder, SessionOptions,
    SessionSnapshot,
};
pub use infrastructure::{BackoffPolicy, SessionEvent, SessionObserver, TracingObserver};
pub use messaging::{InboundMessages, OverflowPolicy};
pub use transport::{Framing, StompWebSocketTransport};
pub use types::{OutboundMessage, Result, SessionError, SessionIdentity};
