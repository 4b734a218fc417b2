//! Job status events and the cross-process Status Fan-out Bus.
//!
//! - [`StatusEvent`]: a job status change, as pushed to live clients.
//! - [`FanoutMessage`]: the `{job_id, message}` envelope carried on the bus.
//! - [`FanoutBus`]: publish/subscribe seam with two implementations:
//!   [`LocalBus`] (in-process `tokio::sync::broadcast`) and
//!   [`PgNotifyBus`] (Postgres `LISTEN/NOTIFY`).
//!
//! Delivery is at-most-once. A process that is not subscribed when a
//! message is published never sees it; there is no replay.

pub mod bus;
pub mod event;
pub mod pg;

pub use bus::{BusError, BusReceiver, FanoutBus, LocalBus};
pub use event::{FailureReason, FanoutMessage, StatusEvent};
pub use pg::PgNotifyBus;

/// Name of the shared fan-out channel.
pub const JOBS_CHANNEL: &str = "jobs_channel";
