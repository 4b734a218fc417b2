use std::sync::Arc;
use std::time::Duration;

use crate::ws::registry::LiveRegistry;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that sends periodic Ping frames to every live
/// connection.
///
/// The task runs until aborted; `main` aborts it during shutdown.
pub fn start_heartbeat(registry: Arc<LiveRegistry>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            interval.tick().await;
            let count = registry.connection_count();
            tracing::debug!(count, "WebSocket heartbeat ping");
            registry.ping_all();
        }
    })
}
