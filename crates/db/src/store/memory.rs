use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pixelforge_core::pagination::PageRequest;
use pixelforge_core::types::DbId;

use super::JobStore;
use crate::models::job::{Job, NewJob};
use crate::models::status::JobStatus;

#[derive(Default)]
struct Inner {
    next_id: DbId,
    jobs: BTreeMap<DbId, Job>,
}

/// In-process [`JobStore`] with the same conditional-transition semantics as
/// the Postgres store. Used by tests and single-process development runs.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a job's `updated_at`, to simulate a job that has been idle.
    pub fn set_updated_at(&self, id: DbId, at: DateTime<Utc>) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&id) {
            job.updated_at = at;
        }
    }

    /// Overwrite a job's `started_at`, to simulate a job that has been
    /// processing for a long time.
    pub fn set_started_at(&self, id: DbId, at: DateTime<Utc>) {
        if let Some(job) = self.inner.lock().jobs.get_mut(&id) {
            job.started_at = Some(at);
        }
    }

    /// Snapshot of every stored job, in id order.
    pub fn all(&self) -> Vec<Job> {
        self.inner.lock().jobs.values().cloned().collect()
    }

    fn transition(
        &self,
        id: DbId,
        next: JobStatus,
        apply: impl FnOnce(&mut Job, DateTime<Utc>),
    ) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id)?;
        if !JobStatus::legal_sources(next).contains(&job.status) {
            return None;
        }
        let now = Utc::now();
        job.status = next;
        job.updated_at = now;
        apply(job, now);
        Some(job.clone())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: &NewJob) -> Result<Job, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: inner.next_id,
            user_id: input.user_id,
            filename: input.filename.clone(),
            input_path: input.input_path.clone(),
            output_path: None,
            original_format: input.original_format,
            target_format: input.target_format,
            status: JobStatus::Pending,
            error_message: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.inner.lock().jobs.get(&id).cloned())
    }

    async fn find_owned(&self, id: DbId, user_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .jobs
            .get(&id)
            .filter(|job| job.user_id == user_id)
            .cloned())
    }

    async fn list_owned(
        &self,
        user_id: DbId,
        page: &PageRequest,
    ) -> Result<(Vec<Job>, i64), sqlx::Error> {
        let inner = self.inner.lock();
        let owned: Vec<&Job> = inner
            .jobs
            .values()
            .rev()
            .filter(|job| job.user_id == user_id)
            .collect();
        let total = owned.len() as i64;
        let rows = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((rows, total))
    }

    async fn mark_processing(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.transition(id, JobStatus::Processing, |job, now| {
            job.started_at.get_or_insert(now);
        }))
    }

    async fn mark_succeeded(
        &self,
        id: DbId,
        output_path: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.transition(id, JobStatus::Success, |job, now| {
            job.output_path = Some(output_path.to_string());
            job.error_message = None;
            job.finished_at = Some(now);
        }))
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.transition(id, JobStatus::Failed, |job, now| {
            job.output_path = None;
            job.error_message = Some(error.to_string());
            job.finished_at = Some(now);
        }))
    }

    async fn fail_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let mut failed = Vec::new();
        for job in inner.jobs.values_mut() {
            let started_before_cutoff = job.started_at.is_some_and(|at| at < cutoff);
            if job.status == JobStatus::Processing && started_before_cutoff {
                job.status = JobStatus::Failed;
                job.output_path = None;
                job.error_message = Some(error.to_string());
                job.finished_at = Some(now);
                job.updated_at = now;
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.updated_at < cutoff)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn touch(&self, id: DbId) -> Result<(), sqlx::Error> {
        if let Some(job) = self.inner.lock().jobs.get_mut(&id) {
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}
