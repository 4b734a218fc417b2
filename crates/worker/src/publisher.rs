use std::sync::Arc;

use pixelforge_events::{FanoutBus, StatusEvent};

/// Best-effort status publishing.
///
/// Runs only after the matching state commit, and a publish failure never
/// propagates: the committed state is the source of truth and live
/// notifications are at-most-once.
#[derive(Clone)]
pub struct StatusPublisher {
    bus: Arc<dyn FanoutBus>,
}

impl StatusPublisher {
    pub fn new(bus: Arc<dyn FanoutBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, event: StatusEvent) {
        let message = match event.to_fanout() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(job_id = event.job_id, error = %e, "Failed to encode status event");
                return;
            }
        };
        match self.bus.publish(&message).await {
            Ok(()) => tracing::debug!(
                job_id = event.job_id,
                status = event.status.name(),
                "Status event published",
            ),
            Err(e) => tracing::warn!(
                job_id = event.job_id,
                status = event.status.name(),
                error = %e,
                "Failed to publish status event",
            ),
        }
    }
}
