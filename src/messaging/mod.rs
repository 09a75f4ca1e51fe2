// Messaging module - Outbound buffering and inbound fan-out
pub mod queue;
pub mod relay;

pub use queue::{OutboundQueue, OverflowPolicy};
pub use relay::{InboundMessages, InboundRelay};
