// Module declarations
mod connection;

// Public API exports
pub use connection::{ConnectionSession, SessionCallbacks};
