//! Session lifecycle: authenticate, connect, dispatch, tear down.

pub mod connection;
pub mod lifecycle;
pub mod session;
pub mod state;

pub use connection::SessionConnection;
pub use lifecycle::{
    DaemonExit, DaemonLifecycle, LifecycleDeps, LifecycleEvent, LifecycleHandle,
    LifecycleSettings,
};
pub use session::Session;
pub use state::{LifecycleState, RetryCounter, RetryPolicy};
