//! Repository for the `jobs` table.
//!
//! Every state transition is a single `UPDATE ... WHERE status_id IN (...)`
//! so it commits atomically and can never move a job backwards. A transition
//! that matches no row returns `None`.

use chrono::{DateTime, Utc};
use pixelforge_core::pagination::PageRequest;
use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{Job, NewJob};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, user_id, filename, input_path, output_path, \
    original_format, target_format, status_id, error_message, \
    created_at, started_at, finished_at, updated_at";

fn source_ids(next: JobStatus) -> Vec<StatusId> {
    JobStatus::legal_sources(next)
        .iter()
        .map(|s| s.id())
        .collect()
}

/// Provides CRUD and transition operations for conversion jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `Pending` status.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (user_id, filename, input_path, original_format, target_format, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.user_id)
            .bind(&input.filename)
            .bind(&input.input_path)
            .bind(input.original_format.extension())
            .bind(input.target_format.extension())
            .bind(JobStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by ID only if it belongs to `user_id`.
    pub async fn find_owned(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs newest-first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        page: &PageRequest,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE user_id = $1 \
             ORDER BY id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(pool)
            .await
    }

    /// Count a user's jobs.
    pub async fn count_by_user(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// `Pending|Processing -> Processing`, stamping `started_at` on first entry.
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, started_at = COALESCE(started_at, NOW()), updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Processing.id())
            .bind(source_ids(JobStatus::Processing))
            .fetch_optional(pool)
            .await
    }

    /// `Processing -> Success`, recording the converted blob key.
    pub async fn mark_succeeded(
        pool: &PgPool,
        id: DbId,
        output_path: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, output_path = $3, error_message = NULL, \
                 finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Success.id())
            .bind(output_path)
            .bind(source_ids(JobStatus::Success))
            .fetch_optional(pool)
            .await
    }

    /// `Processing -> Failed`, keeping the error detail for operators.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, output_path = NULL, error_message = $3, \
                 finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = ANY($4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(JobStatus::Failed.id())
            .bind(error)
            .bind(source_ids(JobStatus::Failed))
            .fetch_optional(pool)
            .await
    }

    /// Fail every `Processing` job first started before `cutoff`.
    pub async fn fail_stale_processing(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, output_path = NULL, error_message = $2, \
                 finished_at = NOW(), updated_at = NOW() \
             WHERE status_id = $3 AND started_at < $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Failed.id())
            .bind(error)
            .bind(JobStatus::Processing.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Oldest jobs still `Pending` since before `cutoff`.
    pub async fn list_stale_pending(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id = $1 AND updated_at < $2 \
             ORDER BY id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.id())
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Bump `updated_at` so a re-enqueued pending job is not picked up again
    /// by the next supervisor sweep.
    pub async fn touch(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
