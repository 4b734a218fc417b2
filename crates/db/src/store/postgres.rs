use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixelforge_core::pagination::PageRequest;
use pixelforge_core::types::DbId;

use super::JobStore;
use crate::models::job::{Job, NewJob};
use crate::repositories::JobRepo;
use crate::DbPool;

/// [`JobStore`] backed by the `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &NewJob) -> Result<Job, sqlx::Error> {
        JobRepo::create(&self.pool, input).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_by_id(&self.pool, id).await
    }

    async fn find_owned(&self, id: DbId, user_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::find_owned(&self.pool, id, user_id).await
    }

    async fn list_owned(
        &self,
        user_id: DbId,
        page: &PageRequest,
    ) -> Result<(Vec<Job>, i64), sqlx::Error> {
        let total = JobRepo::count_by_user(&self.pool, user_id).await?;
        let rows = JobRepo::list_by_user(&self.pool, user_id, page).await?;
        Ok((rows, total))
    }

    async fn mark_processing(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::mark_processing(&self.pool, id).await
    }

    async fn mark_succeeded(
        &self,
        id: DbId,
        output_path: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::mark_succeeded(&self.pool, id, output_path).await
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<Option<Job>, sqlx::Error> {
        JobRepo::mark_failed(&self.pool, id, error).await
    }

    async fn fail_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::fail_stale_processing(&self.pool, cutoff, error).await
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        JobRepo::list_stale_pending(&self.pool, cutoff, limit).await
    }

    async fn touch(&self, id: DbId) -> Result<(), sqlx::Error> {
        JobRepo::touch(&self.pool, id).await
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        crate::health_check(&self.pool).await
    }
}
