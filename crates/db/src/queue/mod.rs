//! The Job Queue Client.
//!
//! Tasks are at-least-once: a claimed task stays invisible to other
//! consumers until its [`Delivery`] is acked (removed) or nacked (scheduled
//! for retry with exponential backoff). Every claim counts as an attempt,
//! including one whose consumer dies before settling it, so a task that
//! keeps crashing its consumer still reaches the attempt limit and becomes
//! a dead letter.

use std::time::Duration;

use async_trait::async_trait;
use pixelforge_core::types::DbId;
use serde::{Deserialize, Serialize};

mod memory;
mod postgres;

pub use memory::MemoryTaskQueue;
pub use postgres::PgTaskQueue;

/// Task name carried by conversion requests.
pub const CONVERT_IMAGE_TASK: &str = "convert_image";

/// Default number of attempts before a task becomes a dead letter. Also the
/// default of the worker's `TASK_MAX_ATTEMPTS`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("malformed task: {0}")]
    Malformed(String),
}

/// Wire shape of a queued task: `{"task": "<name>", "args": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// Typed form of a `convert_image` task. Its only argument is the job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertImageTask {
    pub job_id: DbId,
}

impl ConvertImageTask {
    pub fn new(job_id: DbId) -> Self {
        Self { job_id }
    }

    pub fn to_message(self) -> TaskMessage {
        TaskMessage {
            task: CONVERT_IMAGE_TASK.to_string(),
            args: vec![serde_json::Value::from(self.job_id)],
        }
    }

    /// Decode a queued message, rejecting unknown task names and bad args.
    pub fn from_message(message: &TaskMessage) -> Result<Self, QueueError> {
        if message.task != CONVERT_IMAGE_TASK {
            return Err(QueueError::Malformed(format!(
                "unknown task '{}'",
                message.task
            )));
        }
        match message.args.as_slice() {
            [arg] => arg
                .as_i64()
                .map(Self::new)
                .ok_or_else(|| QueueError::Malformed(format!("job id must be an integer, got {arg}"))),
            args => Err(QueueError::Malformed(format!(
                "expected 1 argument, got {}",
                args.len()
            ))),
        }
    }
}

/// Retry policy shared by queue implementations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further failure.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before a task that has failed `failures` times is retried.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << exp)
    }
}

/// Producer and consumer side of the work queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task and return its id once it is durable.
    async fn enqueue(&self, message: &TaskMessage) -> Result<DbId, QueueError>;

    /// Claim the next ready task, if any.
    async fn dequeue(&self) -> Result<Option<Box<dyn Delivery>>, QueueError>;

    /// Whether `message` is queued, backing off or in flight, i.e. not yet
    /// acked and not dead-lettered.
    async fn has_live_task(&self, message: &TaskMessage) -> Result<bool, QueueError>;

    /// Tasks that exhausted their attempts.
    async fn dead_letter_count(&self) -> Result<i64, QueueError>;
}

/// A claimed task. Settle it with [`ack`](Delivery::ack) or
/// [`nack`](Delivery::nack). Dropping it unsettled behaves like a nack.
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> &TaskMessage;

    /// 1-based attempt number of this delivery, counting every earlier
    /// claim whether it was settled or not.
    fn attempt(&self) -> u32;

    fn max_attempts(&self) -> u32;

    fn is_final_attempt(&self) -> bool {
        self.attempt() >= self.max_attempts()
    }

    /// Remove the task from the queue.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Give the task back. It is retried after a backoff, or dead-lettered
    /// if this was its final attempt.
    async fn nack(self: Box<Self>) -> Result<(), QueueError>;
}
