// Infrastructure module - Background services and policies
pub mod backoff;
pub mod observer;
pub mod task_manager;
pub mod timer;

pub use backoff::BackoffPolicy;
pub use observer::{FailureKind, SessionEvent, SessionObserver, TracingObserver};
pub use task_manager::TaskManager;
pub use timer::ReconnectTimer;
