use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Cancellable one-shot timer for reconnection.
///
/// Each schedule gets a fresh ticket. The fired callback receives it so the owner
/// can discard a firing that raced with `cancel`.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    handle: Option<JoinHandle<()>>,
    ticket: u64,
    delay: Option<Duration>,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_fire(ticket)` after `delay`, replacing any pending schedule
    pub fn schedule<F, Fut>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.ticket += 1;
        let ticket = self.ticket;
        self.delay = Some(delay);
        self.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            on_fire(ticket).await;
        }));
        ticket
    }

    /// Cancel the pending schedule, if any
    pub fn cancel(&mut self) -> bool {
        self.delay = None;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                // Invalidate a firing that was already queued
                self.ticket += 1;
                true
            }
            None => false,
        }
    }

    /// Mark `ticket` as fired. Returns false for stale tickets.
    pub fn fire(&mut self, ticket: u64) -> bool {
        if ticket != self.ticket || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        self.delay = None;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Delay of the pending schedule
    pub fn pending_delay(&self) -> Option<Duration> {
        self.delay
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
