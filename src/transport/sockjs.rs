//! SockJS framing over a raw WebSocket.
//!
//! Server frames: `o` open, `h` heartbeat, `a[...]` message batch, `m"..."` single
//! message, `c[code,"reason"]` close. Client frames are JSON arrays of strings.

use crate::types::{Result, SessionError};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

pub fn decode(text: &str) -> Result<SockJsFrame> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or_else(|| bad_frame(text))?;
    let rest = chars.as_str();
    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => Ok(SockJsFrame::Messages(serde_json::from_str(rest)?)),
        'm' => Ok(SockJsFrame::Messages(vec![serde_json::from_str(rest)?])),
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(rest)?;
            Ok(SockJsFrame::Close { code, reason })
        }
        _ => Err(bad_frame(text)),
    }
}

/// Wrap outgoing payloads in a client frame
pub fn encode(messages: &[&str]) -> String {
    serde_json::Value::Array(
        messages
            .iter()
            .map(|message| serde_json::Value::from(*message))
            .collect(),
    )
    .to_string()
}

fn bad_frame(text: &str) -> SessionError {
    SessionError::Protocol {
        message: "unexpected SockJS frame".to_string(),
        details: text.chars().take(64).collect(),
    }
}

/// Random 3-digit server id
pub fn server_id() -> String {
    format!("{:03}", uuid::Uuid::new_v4().as_u128() % 1000)
}

/// Random session id
pub fn session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// `{endpoint}/{server}/{session}/websocket` with a ws/wss scheme
pub fn websocket_url(endpoint: &Url, server_id: &str, session_id: &str) -> Result<Url> {
    let mut url = to_scheme(endpoint, WebScheme::WebSocket)?;
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| SessionError::Configuration(format!("invalid endpoint: {}", endpoint)))?
        .pop_if_empty()
        .push(server_id)
        .push(session_id)
        .push("websocket");
    Ok(url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WebScheme {
    Http,
    WebSocket,
}

/// Switch between http(s) and ws(s), keeping TLS-ness
pub(crate) fn to_scheme(endpoint: &Url, target: WebScheme) -> Result<Url> {
    let secure = matches!(endpoint.scheme(), "https" | "wss");
    let scheme = match (target, secure) {
        (WebScheme::Http, false) => "http",
        (WebScheme::Http, true) => "https",
        (WebScheme::WebSocket, false) => "ws",
        (WebScheme::WebSocket, true) => "wss",
    };
    let mut url = endpoint.clone();
    url.set_scheme(scheme).map_err(|_| {
        SessionError::Configuration(format!("unsupported endpoint scheme: {}", endpoint.scheme()))
    })?;
    Ok(url)
}

/// Response of the SockJS `/info` endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InfoResponse {
    #[serde(default = "default_websocket")]
    pub websocket: bool,
    #[serde(default)]
    pub cookie_needed: bool,
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub entropy: u64,
}

fn default_websocket() -> bool {
    true
}

/// Query `{endpoint}/info` and fail if the server disables WebSocket
pub async fn probe_info(endpoint: &Url) -> Result<InfoResponse> {
    let mut url = to_scheme(endpoint, WebScheme::Http)?;
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| SessionError::Configuration(format!("invalid endpoint: {}", endpoint)))?
        .pop_if_empty()
        .push("info");
    let cache_buster = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    url.query_pairs_mut()
        .append_pair("t", &cache_buster.to_string());

    let response = reqwest::Client::new().get(url.as_str()).send().await?;
    if !response.status().is_success() {
        return Err(SessionError::ConnectFailure(format!(
            "SockJS info request failed with status: {}",
            response.status()
        )));
    }

    let info: InfoResponse = response.json().await?;
    if !info.websocket {
        return Err(SessionError::ConnectFailure(
            "server has the websocket transport disabled".to_string(),
        ));
    }

    tracing::debug!(
        cookie_needed = info.cookie_needed,
        origins = ?info.origins,
        "SockJS info"
    );
    Ok(info)
}
