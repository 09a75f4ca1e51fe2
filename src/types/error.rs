use thiserror::Error;

/// Errors that can occur when using the chat session client.
///
/// `ConnectFailure`, `SendFailure` and `Protocol` are recovered internally by the
/// reconnect loop; they reach callers only through observer events and logs.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport could not establish a session
    #[error("Connect failure: {0}")]
    ConnectFailure(String),

    /// A publish on a believed-connected session failed
    #[error("Send failure: {0}")]
    SendFailure(String),

    /// The server sent an application-level error frame
    #[error("Protocol error: {message}")]
    Protocol {
        /// Diagnostic from the frame's `message` header
        message: String,
        /// Frame body, if any
        details: String,
    },

    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request error (SockJS info probe)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport cannot carry this payload; retrying will not help
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A connect header could not be placed on the WebSocket handshake
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `connect` was called while a session is connecting or connected
    #[error("Already connected")]
    AlreadyConnected,

    /// The outbound queue is at capacity and rejects new payloads
    #[error("Outbound queue full")]
    QueueFull,

    /// Reconnection stopped after reaching the configured attempt limit
    #[error("Reconnection abandoned after {0} attempts")]
    Abandoned(u32),

    /// The session worker has shut down
    #[error("Session manager closed")]
    Closed,
}

/// Convenience type alias for `Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;
