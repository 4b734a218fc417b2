//! Postgres `LISTEN/NOTIFY` fan-out bus.
//!
//! Publishing is `SELECT pg_notify(channel, json)`; every process holding a
//! [`PgListener`] on the channel receives the payload. When the listener's
//! connection drops, `sqlx` reconnects and re-issues `LISTEN` on the next
//! receive. Notifications sent while disconnected are lost.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::bus::{BusError, BusReceiver, FanoutBus};
use crate::event::FanoutMessage;
use crate::JOBS_CHANNEL;

/// Backoff between failed reconnects.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed reconnects after which the subscription closes.
    pub max_failures: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_failures: 10,
        }
    }
}

/// Fan-out bus over Postgres notifications.
#[derive(Clone)]
pub struct PgNotifyBus {
    pool: PgPool,
    channel: String,
    reconnect: ReconnectPolicy,
}

impl PgNotifyBus {
    pub fn new(pool: PgPool) -> Self {
        Self::with_channel(pool, JOBS_CHANNEL)
    }

    pub fn with_channel(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[async_trait]
impl FanoutBus for PgNotifyBus {
    async fn publish(&self, message: &FanoutMessage) -> Result<(), BusError> {
        let payload = serde_json::to_string(message)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn BusReceiver>, BusError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Subscribed to fan-out channel");
        Ok(Box::new(PgReceiver {
            listener,
            channel: self.channel.clone(),
            reconnect: self.reconnect.clone(),
        }))
    }
}

struct PgReceiver {
    listener: PgListener,
    channel: String,
    reconnect: ReconnectPolicy,
}

#[async_trait]
impl BusReceiver for PgReceiver {
    async fn recv(&mut self) -> Option<FanoutMessage> {
        let mut delay = self.reconnect.initial_delay;
        let mut failures = 0u32;

        loop {
            match self.listener.try_recv().await {
                Ok(Some(notification)) => {
                    match serde_json::from_str::<FanoutMessage>(notification.payload()) {
                        Ok(message) => return Some(message),
                        Err(e) => {
                            tracing::warn!(
                                channel = %self.channel,
                                error = %e,
                                "Skipping malformed fan-out payload",
                            );
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!(
                        channel = %self.channel,
                        "Fan-out listener connection lost, reconnecting; \
                         notifications in the gap are lost",
                    );
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.reconnect.max_failures {
                        tracing::error!(
                            channel = %self.channel,
                            failures,
                            error = %e,
                            "Fan-out listener could not reconnect, giving up",
                        );
                        return None;
                    }
                    tracing::warn!(
                        channel = %self.channel,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fan-out listener error, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.reconnect.max_delay);
                }
            }
        }
    }
}
