//! Repository for the `conversion_tasks` work queue.
//!
//! A claim is two steps: a committed `UPDATE` that picks the next ready row
//! with `FOR UPDATE SKIP LOCKED` and charges it an attempt, then a row lock
//! taken in the caller's transaction and held until the delivery settles.
//! While locked the row is skipped by other consumers.

use pixelforge_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::task::TaskRow;

/// Column list for `conversion_tasks` queries.
const COLUMNS: &str = "id, task_name, payload, attempts, last_attempt, created_at";

/// Provides queue operations over `conversion_tasks`.
pub struct TaskRepo;

impl TaskRepo {
    /// Append a task. Returns the new task id.
    pub async fn insert(
        pool: &PgPool,
        task_name: &str,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO conversion_tasks (task_name, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(task_name)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Claim the next task that is ready to run, charging it an attempt.
    ///
    /// The claim commits on its own, so the attempt is counted even if the
    /// consumer dies before settling. A task claimed `n` times becomes ready
    /// again `base_backoff_secs * 2^(n-1)` seconds after its last attempt.
    /// Tasks at `max_attempts` are dead letters and are never returned.
    pub async fn claim_next(
        pool: &PgPool,
        max_attempts: i32,
        base_backoff_secs: f64,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!(
            "UPDATE conversion_tasks \
             SET attempts = attempts + 1, last_attempt = NOW() \
             WHERE id = ( \
                 SELECT id FROM conversion_tasks \
                 WHERE attempts < $1 \
                   AND (last_attempt IS NULL \
                        OR last_attempt < NOW() - INTERVAL '1 second' * ($2::float8 * POWER(2, GREATEST(attempts - 1, 0)))) \
                 ORDER BY id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(max_attempts)
            .bind(base_backoff_secs)
            .fetch_optional(pool)
            .await
    }

    /// Lock a claimed task for the lifetime of `tx`.
    ///
    /// Returns `false` when the row is gone, locked by another consumer, or
    /// was claimed again since `attempts` was read.
    pub async fn lock_claimed_tx(
        tx: &mut Transaction<'_, Postgres>,
        task_id: DbId,
        attempts: i32,
    ) -> Result<bool, sqlx::Error> {
        let locked = sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM conversion_tasks WHERE id = $1 AND attempts = $2 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(task_id)
        .bind(attempts)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(locked.is_some())
    }

    /// Remove an acknowledged task.
    pub async fn delete_tx(
        tx: &mut Transaction<'_, Postgres>,
        task_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM conversion_tasks WHERE id = $1")
            .bind(task_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Restart the backoff clock of a failed attempt. The attempt itself
    /// was counted at claim time.
    pub async fn record_failure_tx(
        tx: &mut Transaction<'_, Postgres>,
        task_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE conversion_tasks SET last_attempt = NOW() WHERE id = $1")
            .bind(task_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Number of tasks that exhausted their attempts. A final attempt still
    /// in flight holds its row lock and is not counted.
    pub async fn dead_letter_count(pool: &PgPool, max_attempts: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ( \
                 SELECT id FROM conversion_tasks WHERE attempts >= $1 \
                 FOR UPDATE SKIP LOCKED) dead",
        )
        .bind(max_attempts)
        .fetch_one(pool)
        .await
    }

    /// Number of rows carrying `payload` that are not dead letters: waiting,
    /// backing off, or in flight.
    pub async fn live_count(
        pool: &PgPool,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT \
                 (SELECT COUNT(*) FROM conversion_tasks WHERE payload = $1) \
               - (SELECT COUNT(*) FROM ( \
                      SELECT id FROM conversion_tasks \
                      WHERE payload = $1 AND attempts >= $2 \
                      FOR UPDATE SKIP LOCKED) dead)",
        )
        .bind(payload)
        .bind(max_attempts)
        .fetch_one(pool)
        .await
    }
}
