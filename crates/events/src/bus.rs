//! The fan-out bus seam and its in-process implementation.
//!
//! [`LocalBus`] is a `tokio::sync::broadcast` channel. Every API router and
//! worker sharing one `Arc<LocalBus>` behaves like a set of processes
//! subscribed to the same shared channel, which is how single-binary
//! deployments and tests run.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::event::FanoutMessage;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("fan-out bus unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("failed to encode fan-out message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Cross-process publish/subscribe channel for status events.
///
/// Publishes from one publisher are delivered in order. Delivery is
/// at-most-once per subscriber with no replay for late subscribers.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    async fn publish(&self, message: &FanoutMessage) -> Result<(), BusError>;

    /// Open a new subscription. Only messages published afterwards are seen.
    async fn subscribe(&self) -> Result<Box<dyn BusReceiver>, BusError>;
}

/// One subscription to a [`FanoutBus`].
#[async_trait]
pub trait BusReceiver: Send {
    /// Wait for the next message.
    ///
    /// Transient gaps (lag, reconnects) are logged and skipped. `None` means
    /// the subscription is permanently closed.
    async fn recv(&mut self) -> Option<FanoutMessage>;
}

// ---------------------------------------------------------------------------
// LocalBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus.
pub struct LocalBus {
    sender: broadcast::Sender<FanoutMessage>,
}

impl LocalBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest unconsumed messages are dropped
    /// and slow receivers skip ahead.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl FanoutBus for LocalBus {
    async fn publish(&self, message: &FanoutMessage) -> Result<(), BusError> {
        // A send error only means there are zero subscribers.
        let _ = self.sender.send(message.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn BusReceiver>, BusError> {
        Ok(Box::new(LocalReceiver {
            rx: self.sender.subscribe(),
        }))
    }
}

struct LocalReceiver {
    rx: broadcast::Receiver<FanoutMessage>,
}

#[async_trait]
impl BusReceiver for LocalReceiver {
    async fn recv(&mut self) -> Option<FanoutMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Fan-out subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(job_id: i64, status: &str) -> FanoutMessage {
        FanoutMessage {
            job_id,
            message: json!({"type": "job_status", "job_id": job_id, "status": status}),
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = LocalBus::default();
        let mut rx = bus.subscribe().await.unwrap();

        bus.publish(&message(42, "PROCESSING")).await.unwrap();

        let received = rx.recv().await.expect("should receive the message");
        assert_eq!(received.job_id, 42);
        assert_eq!(received.message["status"], "PROCESSING");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_message() {
        let bus = LocalBus::default();
        let mut rx1 = bus.subscribe().await.unwrap();
        let mut rx2 = bus.subscribe().await.unwrap();

        bus.publish(&message(1, "SUCCESS")).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().job_id, 1);
        assert_eq!(rx2.recv().await.unwrap().job_id, 1);
    }

    #[tokio::test]
    async fn single_publisher_order_is_preserved() {
        let bus = LocalBus::default();
        let mut rx = bus.subscribe().await.unwrap();

        bus.publish(&message(7, "PROCESSING")).await.unwrap();
        bus.publish(&message(8, "PROCESSING")).await.unwrap();
        bus.publish(&message(7, "SUCCESS")).await.unwrap();

        let statuses: Vec<(i64, String)> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|m| (m.job_id, m.message["status"].as_str().unwrap().to_string()))
        .collect();

        assert_eq!(
            statuses,
            vec![
                (7, "PROCESSING".to_string()),
                (8, "PROCESSING".to_string()),
                (7, "SUCCESS".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_messages() {
        let bus = LocalBus::default();
        bus.publish(&message(1, "PROCESSING")).await.unwrap();

        let mut rx = bus.subscribe().await.unwrap();
        bus.publish(&message(1, "SUCCESS")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message["status"], "SUCCESS");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_ok() {
        let bus = LocalBus::default();
        bus.publish(&message(1, "FAILED")).await.unwrap();
    }

    #[tokio::test]
    async fn lagged_receiver_skips_ahead() {
        let bus = LocalBus::new(2);
        let mut rx = bus.subscribe().await.unwrap();
        for job_id in 1..=4 {
            bus.publish(&message(job_id, "PROCESSING")).await.unwrap();
        }

        // The two oldest messages were overwritten.
        assert_eq!(rx.recv().await.unwrap().job_id, 3);
        assert_eq!(rx.recv().await.unwrap().job_id, 4);
    }

    #[tokio::test]
    async fn dropping_the_bus_closes_receivers() {
        let bus = LocalBus::default();
        let mut rx = bus.subscribe().await.unwrap();
        drop(bus);
        assert!(rx.recv().await.is_none());
    }
}
