//! The fan-out listener: the single bridge from the cross-process bus to
//! this process's live connections.

use std::sync::Arc;

use axum::extract::ws::Message;
use pixelforge_events::{BusError, FanoutBus, FanoutMessage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ws::registry::LiveRegistry;

/// Why the listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// Shutdown was requested.
    Cancelled,
    /// The bus subscription ended. Live notifications are down for this
    /// process.
    BusClosed,
}

/// Subscribe to the bus and spawn the delivery loop.
///
/// The subscription exists once this returns, so any event published after
/// that point reaches the registry. A failure to subscribe is returned to
/// the caller rather than leaving the process silently deaf.
pub async fn start_fanout_listener(
    bus: Arc<dyn FanoutBus>,
    registry: Arc<LiveRegistry>,
    cancel: CancellationToken,
) -> Result<JoinHandle<ListenerExit>, BusError> {
    let mut rx = bus.subscribe().await?;
    tracing::info!("Fan-out listener subscribed");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Fan-out listener stopping");
                    return ListenerExit::Cancelled;
                }
                next = rx.recv() => match next {
                    Some(message) => forward(&registry, message),
                    None => {
                        tracing::error!(
                            "Fan-out bus subscription ended; live job notifications are no longer delivered",
                        );
                        return ListenerExit::BusClosed;
                    }
                },
            }
        }
    }))
}

fn forward(registry: &LiveRegistry, message: FanoutMessage) {
    let job_id = message.job_id;
    if registry.subscriber_count(job_id) == 0 {
        return;
    }
    let text = message.message.to_string();
    let delivered = registry.deliver(job_id, Message::Text(text.into()));
    tracing::debug!(job_id, delivered, "Status event forwarded");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pixelforge_db::models::status::JobStatus;
    use pixelforge_events::{LocalBus, StatusEvent};

    use super::*;

    async fn next_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> String {
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match msg {
            Message::Text(t) => t.as_str().to_owned(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forwards_only_to_the_events_job() {
        let bus = Arc::new(LocalBus::default());
        let registry = Arc::new(LiveRegistry::new());
        let cancel = CancellationToken::new();
        let handle = start_fanout_listener(bus.clone(), registry.clone(), cancel.clone())
            .await
            .unwrap();

        let (_sub_x, mut rx_x) = registry.register(1);
        let (_sub_y, mut rx_y) = registry.register(2);

        let event = StatusEvent::new(1, JobStatus::Processing);
        bus.publish(&event.to_fanout().unwrap()).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&next_text(&mut rx_x).await).unwrap();
        assert_eq!(body["job_id"], 1);
        assert_eq!(body["status"], "PROCESSING");
        assert!(rx_y.try_recv().is_err());

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), ListenerExit::Cancelled);
    }

    #[tokio::test]
    async fn keeps_publish_order_per_job() {
        let bus = Arc::new(LocalBus::default());
        let registry = Arc::new(LiveRegistry::new());
        let cancel = CancellationToken::new();
        let _handle = start_fanout_listener(bus.clone(), registry.clone(), cancel.clone())
            .await
            .unwrap();
        let (_sub, mut rx) = registry.register(4);

        for status in [JobStatus::Processing, JobStatus::Success] {
            let event = StatusEvent::new(4, status);
            bus.publish(&event.to_fanout().unwrap()).await.unwrap();
        }

        let first: serde_json::Value = serde_json::from_str(&next_text(&mut rx).await).unwrap();
        let second: serde_json::Value = serde_json::from_str(&next_text(&mut rx).await).unwrap();
        assert_eq!(first["status"], "PROCESSING");
        assert_eq!(second["status"], "SUCCESS");
        cancel.cancel();
    }

    #[tokio::test]
    async fn closed_bus_ends_the_listener() {
        let bus = Arc::new(LocalBus::default());
        let registry = Arc::new(LiveRegistry::new());
        let handle = start_fanout_listener(bus.clone(), registry, CancellationToken::new())
            .await
            .unwrap();

        drop(bus);
        let exit = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener should stop")
            .unwrap();
        assert_eq!(exit, ListenerExit::BusClosed);
    }
}
