// Module declarations
mod builder;
mod core;
mod identity;
mod state;
mod worker;

// Public API exports
pub use builder::{SessionManagerBuilder, SessionOptions};
pub use self::core::SessionManager;
pub use identity::ClientIdentity;
pub use state::{ClientState, ConnectionState, SessionSnapshot};
