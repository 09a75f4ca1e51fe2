use crate::types::{MAX_OUTBOUND_QUEUE_SIZE, OutboundMessage, Result, SessionError};
use std::collections::VecDeque;

/// What to do when a push finds the queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep the queue as is and reject the new payload
    #[default]
    RejectNew,
    /// Evict the oldest payload to make room
    DropOldest,
}

/// FIFO buffer of payloads waiting for a usable session
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Append at the back.
    ///
    /// Returns the evicted payload under `DropOldest`, or `QueueFull` under `RejectNew`.
    pub fn push(&mut self, message: OutboundMessage) -> Result<Option<OutboundMessage>> {
        if self.items.len() < self.capacity {
            self.items.push_back(message);
            return Ok(None);
        }

        match self.policy {
            OverflowPolicy::RejectNew => Err(SessionError::QueueFull),
            OverflowPolicy::DropOldest => {
                let evicted = self.items.pop_front();
                self.items.push_back(message);
                Ok(evicted)
            }
        }
    }

    /// Put a payload back at the head after a failed send.
    ///
    /// Bypasses the capacity bound: the payload was already accepted once.
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.items.push_front(message);
    }

    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(MAX_OUTBOUND_QUEUE_SIZE, OverflowPolicy::default())
    }
}
