use crate::types::INBOUND_RELAY_CAPACITY;
use bytes::Bytes;
use tokio::sync::broadcast;

/// Fans inbound message bodies out to every current listener.
///
/// Nothing is buffered for listeners that subscribe later.
#[derive(Debug, Clone)]
pub struct InboundRelay {
    sender: broadcast::Sender<Bytes>,
}

impl InboundRelay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver to all current listeners. Returns how many received it.
    pub fn push(&self, body: Bytes) -> usize {
        // Err only means there are no listeners right now
        self.sender.send(body).unwrap_or(0)
    }

    /// Add a listener that sees messages pushed from now on
    pub fn subscribe(&self) -> InboundMessages {
        InboundMessages {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for InboundRelay {
    fn default() -> Self {
        Self::new(INBOUND_RELAY_CAPACITY)
    }
}

/// Read side of the inbound stream returned by `SessionManager::messages`
#[derive(Debug)]
pub struct InboundMessages {
    receiver: broadcast::Receiver<Bytes>,
}

impl InboundMessages {
    /// Wait for the next message body.
    ///
    /// Returns `None` once the session manager and its relay are gone.
    /// A listener that falls behind skips the messages it missed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.receiver.recv().await {
                Ok(body) => return Some(body),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Inbound listener lagged, messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<Bytes> {
        loop {
            match self.receiver.try_recv() {
                Ok(body) => return Some(body),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Inbound listener lagged, messages skipped");
                }
                Err(_) => return None,
            }
        }
    }
}
