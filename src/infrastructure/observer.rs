use crate::types::SessionIdentity;
use std::time::Duration;

/// Why a failure was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transport could not establish the session
    Connect,
    /// A send on a connected session failed
    Send,
    /// The server sent an error frame
    Protocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect_failure",
            Self::Send => "send_failure",
            Self::Protocol => "protocol_error",
        }
    }
}

/// Lifecycle events emitted by the session manager
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connecting { attempt: u32 },
    Connected { identity: SessionIdentity },
    Disconnected { manual: bool },
    Error {
        kind: FailureKind,
        message: String,
        details: Option<String>,
    },
    PublishQueued { destination: String, queued: usize },
    PublishSent { destination: String, bytes: usize },
    /// The transport refused the payload itself; it was dropped
    PublishRejected { destination: String, reason: String },
    MessageReceived { identity: SessionIdentity, bytes: usize },
    QueueOverflow { destination: String, rejected: bool },
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectAttempt { attempt: u32 },
    Abandoned { attempts: u32 },
}

/// Receives session lifecycle events.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Logs every event through `tracing`.
///
/// Message-level events go to `info` only when verbose, `debug` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Level for per-message events
    pub fn message_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::DEBUG
        }
    }
}

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connecting { attempt } => {
                tracing::info!(attempt, "Connecting to chat endpoint");
            }
            SessionEvent::Connected { identity } => {
                tracing::info!(session_id = %identity, "Chat session connected");
            }
            SessionEvent::Disconnected { manual } => {
                if *manual {
                    tracing::info!("Disconnected");
                } else {
                    tracing::warn!("Connection lost");
                }
            }
            SessionEvent::Error {
                kind,
                message,
                details,
            } => {
                tracing::error!(
                    kind = kind.as_str(),
                    details = details.as_deref().unwrap_or(""),
                    "Session error: {}",
                    message
                );
            }
            SessionEvent::PublishQueued {
                destination,
                queued,
            } => {
                tracing::warn!(
                    destination = %destination,
                    queued,
                    "Not connected, message queued"
                );
            }
            SessionEvent::PublishSent { destination, bytes } => {
                if self.message_level() == tracing::Level::INFO {
                    tracing::info!(destination = %destination, bytes, "Sent message");
                } else {
                    tracing::debug!(destination = %destination, bytes, "Sent message");
                }
            }
            SessionEvent::MessageReceived { identity, bytes } => {
                if self.message_level() == tracing::Level::INFO {
                    tracing::info!(session_id = %identity, bytes, "Received message");
                } else {
                    tracing::debug!(session_id = %identity, bytes, "Received message");
                }
            }
            SessionEvent::PublishRejected {
                destination,
                reason,
            } => {
                tracing::debug!(destination = %destination, reason = %reason, "Payload rejected");
            }
            SessionEvent::QueueOverflow {
                destination,
                rejected,
            } => {
                tracing::debug!(destination = %destination, rejected, "Queue overflow");
            }
            SessionEvent::ReconnectScheduled { attempt, delay } => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            }
            SessionEvent::ReconnectAttempt { attempt } => {
                tracing::info!("Attempting to reconnect... (Attempt {})", attempt);
            }
            SessionEvent::Abandoned { attempts } => {
                tracing::error!(attempts, "Giving up on reconnection");
            }
        }
    }
}
