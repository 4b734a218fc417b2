//! Live job status over WebSocket.
//!
//! Provides the per-process connection registry, the fan-out listener that
//! feeds it from the cross-process bus, heartbeat pings, and the HTTP
//! upgrade handler used by Axum routes.

mod fanout;
mod handler;
mod heartbeat;
pub mod registry;

pub use fanout::{start_fanout_listener, ListenerExit};
pub use handler::job_ws_handler;
pub use heartbeat::start_heartbeat;
pub use registry::{LiveRegistry, Subscription};
