//! Stale job supervisor.
//!
//! Recovers jobs the queue alone cannot: a job stuck in `PROCESSING`
//! (its task dead-lettered, typically after repeated consumer crashes) is
//! failed once it has been processing longer than the timeout, counted from
//! its first start. A job left `PENDING` with no live task (its enqueue
//! never happened) is enqueued again. Runs on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixelforge_db::queue::{ConvertImageTask, TaskQueue};
use pixelforge_db::store::JobStore;
use pixelforge_events::{FailureReason, StatusEvent};
use tokio_util::sync::CancellationToken;

use crate::error::SweepError;
use crate::publisher::StatusPublisher;

/// Most stale pending jobs re-enqueued per sweep.
const REQUEUE_BATCH: i64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub interval: Duration,
    pub processing_timeout: Duration,
    pub pending_timeout: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub requeued: usize,
}

pub struct Supervisor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    publisher: StatusPublisher,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        publisher: StatusPublisher,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            publisher,
            config,
        }
    }

    /// Sweep until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            processing_timeout_secs = self.config.processing_timeout.as_secs(),
            pending_timeout_secs = self.config.pending_timeout.as_secs(),
            "Job supervisor started",
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job supervisor stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(report) if report == SweepReport::default() => {
                            tracing::debug!("Supervisor: nothing stale");
                        }
                        Ok(report) => {
                            tracing::info!(
                                timed_out = report.timed_out,
                                requeued = report.requeued,
                                "Supervisor: recovered stale jobs",
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Supervisor: sweep failed");
                        }
                    }
                }
            }
        }
    }

    /// One pass over stale jobs.
    pub async fn sweep(&self) -> Result<SweepReport, SweepError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let cutoff = stale_cutoff(now, self.config.processing_timeout);
        let detail = format!(
            "timed out after {:?} in PROCESSING",
            self.config.processing_timeout
        );
        for job in self.store.fail_stale_processing(cutoff, &detail).await? {
            tracing::warn!(job_id = job.id, "Stale PROCESSING job marked failed");
            self.publisher
                .publish(StatusEvent::failed(job.id, FailureReason::TimedOut))
                .await;
            report.timed_out += 1;
        }

        let cutoff = stale_cutoff(now, self.config.pending_timeout);
        for job in self.store.list_stale_pending(cutoff, REQUEUE_BATCH).await? {
            let message = ConvertImageTask::new(job.id).to_message();
            if self.queue.has_live_task(&message).await? {
                // Waiting behind a backlog or backing off; the touch keeps
                // it from crowding out real orphans in later batches.
                self.store.touch(job.id).await?;
                tracing::debug!(job_id = job.id, "Stale PENDING job still has a queued task");
                continue;
            }
            let task_id = self.queue.enqueue(&message).await?;
            self.store.touch(job.id).await?;
            tracing::warn!(job_id = job.id, task_id, "Stale PENDING job re-enqueued");
            report.requeued += 1;
        }

        Ok(report)
    }
}

fn stale_cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
