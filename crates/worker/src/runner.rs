//! Queue runner: pulls tasks and settles them.
//!
//! Settlement happens only after the worker's commit for that attempt:
//! success and terminal failures are acked, retryable failures (including
//! an exhausted final attempt) are nacked so the queue applies its backoff
//! and dead-letter policy.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use pixelforge_db::queue::{ConvertImageTask, QueueError, TaskQueue};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::converter::ConversionWorker;

pub struct Runner {
    queue: Arc<dyn TaskQueue>,
    worker: Arc<ConversionWorker>,
    poll_interval: Duration,
}

impl Runner {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        worker: Arc<ConversionWorker>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            worker,
            poll_interval,
        }
    }

    /// Run `concurrency` consumer loops until `cancel` fires.
    ///
    /// A loop finishes its in-flight task before stopping.
    pub async fn run(self: Arc<Self>, concurrency: usize, cancel: CancellationToken) {
        let mut loops = JoinSet::new();
        for slot in 0..concurrency.max(1) {
            let runner = Arc::clone(&self);
            let cancel = cancel.clone();
            loops.spawn(async move { runner.consume(slot, cancel).await });
        }
        tracing::info!(concurrency, "Queue runner started");

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Consumer loop aborted");
            }
        }
        tracing::info!("Queue runner stopped");
    }

    async fn consume(&self, slot: usize, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let idle = match self.run_next().await {
                Ok(true) => false,
                Ok(false) => true,
                Err(e) => {
                    tracing::error!(slot, error = %e, "Failed to run task");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
    }

    /// Claim and run the next task, if there is one.
    ///
    /// Returns `Ok(false)` when the queue had nothing ready.
    pub async fn run_next(&self) -> Result<bool, QueueError> {
        let Some(delivery) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        let task = match ConvertImageTask::from_message(delivery.message()) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, message = ?delivery.message(), "Dropping malformed task");
                delivery.ack().await?;
                return Ok(true);
            }
        };

        let attempt = delivery.attempt();
        let span = tracing::info_span!("task", job_id = task.job_id, attempt);
        let result = AssertUnwindSafe(self.worker.process(task.job_id, delivery.is_final_attempt()))
            .catch_unwind()
            .instrument(span)
            .await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::debug!(job_id = task.job_id, ?outcome, "Task complete");
                delivery.ack().await?;
            }
            Ok(Err(e)) if e.is_retryable() => {
                tracing::debug!(job_id = task.job_id, attempt, "Task nacked for retry");
                delivery.nack().await?;
            }
            Ok(Err(_)) => {
                delivery.ack().await?;
            }
            Err(_) => {
                tracing::error!(job_id = task.job_id, attempt, "Conversion panicked");
                delivery.nack().await?;
            }
        }
        Ok(true)
    }

    /// Run tasks until nothing is ready. Returns how many were handled.
    pub async fn drain(&self) -> Result<usize, QueueError> {
        let mut handled = 0;
        while self.run_next().await? {
            handled += 1;
        }
        Ok(handled)
    }
}
