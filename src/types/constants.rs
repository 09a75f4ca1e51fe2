/// Connect header names (magic strings layer)
pub mod header_names {
    pub const LOGIN_USER_ID: &str = "LOGIN_USER_ID";
    pub const LOGIN_USER_NAME: &str = "LOGIN_USER_NAME";
    pub const USER_ROLES: &str = "USER_ROLES";
    pub const APP_CALL_TYPE: &str = "APP_CALL_TYPE";
    pub const TRACE_ID: &str = "X_APP_TRACE_ID";
}

/// STOMP commands and frame headers
pub mod stomp {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ERROR: &str = "ERROR";
    pub const RECEIPT: &str = "RECEIPT";
    pub const DISCONNECT: &str = "DISCONNECT";

    pub const HEADER_ACCEPT_VERSION: &str = "accept-version";
    pub const HEADER_HEART_BEAT: &str = "heart-beat";
    pub const HEADER_HOST: &str = "host";
    pub const HEADER_DESTINATION: &str = "destination";
    pub const HEADER_ID: &str = "id";
    pub const HEADER_SUBSCRIPTION: &str = "subscription";
    pub const HEADER_CONTENT_LENGTH: &str = "content-length";
    pub const HEADER_CONTENT_TYPE: &str = "content-type";
    pub const HEADER_MESSAGE: &str = "message";
    pub const HEADER_SESSION: &str = "session";
    pub const HEADER_RECEIPT: &str = "receipt";
    pub const HEADER_RECEIPT_ID: &str = "receipt-id";

    pub const SUPPORTED_VERSIONS: &str = "1.2,1.1,1.0";
}

/// Default publish destination for chat payloads
pub const DEFAULT_PUBLISH_DESTINATION: &str = "/app/chatbot";

/// Per-session inbound address is `INBOUND_PREFIX + session_id + INBOUND_SUFFIX`
pub const INBOUND_PREFIX: &str = "/user/";
pub const INBOUND_SUFFIX: &str = "/queue/messages";

/// Role substring that enables verbose message logging
pub const ADMIN_ROLE_MARKER: &str = "Admin";

/// Default heartbeat intervals (milliseconds)
pub const HEARTBEAT_OUTGOING: u64 = 4000;
pub const HEARTBEAT_INCOMING: u64 = 4000;

/// Default reconnect backoff (milliseconds)
pub const BACKOFF_BASE: u64 = 1000;
pub const BACKOFF_MAX: u64 = 30000;

/// Max outbound queue size
pub const MAX_OUTBOUND_QUEUE_SIZE: usize = 1000;

/// Inbound relay capacity per listener
pub const INBOUND_RELAY_CAPACITY: usize = 256;

/// Content type used by the JSON codec
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
