use bytes::Bytes;
use serde::Serialize;

/// An outbound payload bound for a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: String,
    pub body: Bytes,
}

impl OutboundMessage {
    pub fn new(destination: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
        }
    }

    /// Encode `payload` with the JSON codec
    pub fn json<T: Serialize + ?Sized>(
        destination: impl Into<String>,
        payload: &T,
    ) -> super::Result<Self> {
        Ok(Self::new(destination, JsonCodec.encode(payload)?))
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Transport-assigned identity of one live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Per-session inbound address, `{prefix}{id}{suffix}`
    pub fn inbound_address(&self, prefix: &str, suffix: &str) -> String {
        format!("{}{}{}", prefix, self.0, suffix)
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structured-text codec for outbound payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(&self, payload: &T) -> super::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(payload)?))
    }
}
