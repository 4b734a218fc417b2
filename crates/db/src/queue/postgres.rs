use async_trait::async_trait;
use pixelforge_core::types::DbId;
use sqlx::{Postgres, Transaction};

use super::{Delivery, QueueError, RetryPolicy, TaskMessage, TaskQueue};
use crate::repositories::TaskRepo;
use crate::DbPool;

/// [`TaskQueue`] over the `conversion_tasks` table.
///
/// The claim commits the attempt count first; the delivery then keeps a
/// transaction open holding the row lock until it is settled. If the
/// consumer dies, the connection drops, the lock is released and the row
/// becomes claimable again after its backoff, one attempt closer to the
/// dead-letter limit.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: DbPool,
    policy: RetryPolicy,
}

impl PgTaskQueue {
    pub fn new(pool: DbPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, message: &TaskMessage) -> Result<DbId, QueueError> {
        let payload = serde_json::to_value(message)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let id = TaskRepo::insert(&self.pool, &message.task, &payload).await?;
        tracing::debug!(task_id = id, task = %message.task, "Task enqueued");
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        let Some(row) = TaskRepo::claim_next(
            &self.pool,
            self.policy.max_attempts as i32,
            self.policy.base_backoff.as_secs_f64(),
        )
        .await?
        else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;
        if !TaskRepo::lock_claimed_tx(&mut tx, row.id, row.attempts).await? {
            tracing::debug!(task_id = row.id, "Task claimed by another consumer first");
            tx.rollback().await?;
            return Ok(None);
        }

        let message = serde_json::from_value::<TaskMessage>(row.payload.clone())
            .unwrap_or_else(|e| {
                tracing::warn!(task_id = row.id, error = %e, "Task payload is not a task message");
                TaskMessage {
                    task: row.task_name.clone(),
                    args: Vec::new(),
                }
            });

        Ok(Some(Box::new(PgDelivery {
            tx,
            task_id: row.id,
            message,
            attempt: row.attempts.max(1) as u32,
            max_attempts: self.policy.max_attempts,
        })))
    }

    async fn has_live_task(&self, message: &TaskMessage) -> Result<bool, QueueError> {
        let payload = serde_json::to_value(message)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let live = TaskRepo::live_count(&self.pool, &payload, self.policy.max_attempts as i32).await?;
        Ok(live > 0)
    }

    async fn dead_letter_count(&self) -> Result<i64, QueueError> {
        Ok(TaskRepo::dead_letter_count(&self.pool, self.policy.max_attempts as i32).await?)
    }
}

struct PgDelivery {
    tx: Transaction<'static, Postgres>,
    task_id: DbId,
    message: TaskMessage,
    attempt: u32,
    max_attempts: u32,
}

#[async_trait]
impl Delivery for PgDelivery {
    fn message(&self) -> &TaskMessage {
        &self.message
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let PgDelivery {
            mut tx, task_id, ..
        } = *self;
        TaskRepo::delete_tx(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), QueueError> {
        let PgDelivery {
            mut tx,
            task_id,
            attempt,
            max_attempts,
            ..
        } = *self;
        TaskRepo::record_failure_tx(&mut tx, task_id).await?;
        tx.commit().await?;
        if attempt >= max_attempts {
            tracing::error!(task_id, attempt, "Task exhausted its attempts, dead-lettered");
        }
        Ok(())
    }
}
