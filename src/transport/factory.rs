use super::websocket::StompWebSocketClient;
use super::{TransportClient, TransportFactory};
use crate::types::Result;
use std::sync::Arc;
use url::Url;

/// How STOMP frames are carried over the WebSocket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// SockJS session URL and `a[...]` framing
    #[default]
    SockJs,
    /// One STOMP frame per WebSocket message
    Raw,
}

/// Creates STOMP-over-WebSocket clients for one endpoint
#[derive(Debug, Clone)]
pub struct StompWebSocketTransport {
    endpoint: Url,
    framing: Framing,
    probe_info: bool,
}

impl StompWebSocketTransport {
    /// Accepts `http(s)://` or `ws(s)://` endpoints
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            framing: Framing::default(),
            probe_info: true,
        })
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Whether SockJS connections query `{endpoint}/info` first
    pub fn with_info_probe(mut self, probe_info: bool) -> Self {
        self.probe_info = probe_info;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn probes_info(&self) -> bool {
        self.probe_info && self.framing == Framing::SockJs
    }
}

impl TransportFactory for StompWebSocketTransport {
    fn create(&self) -> Arc<dyn TransportClient> {
        tracing::debug!("Creating WebSocket client for {}", self.endpoint);
        Arc::new(StompWebSocketClient::new(self.clone()))
    }
}
