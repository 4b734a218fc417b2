//! The Job Record Store, plus the account store behind sign-in.
//!
//! [`JobStore`] is the only path through which job rows are read or
//! mutated. Callers re-read the row after every await point instead of
//! holding a private mutable copy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixelforge_core::pagination::PageRequest;
use pixelforge_core::types::DbId;

use crate::models::job::{Job, NewJob};
use crate::models::user::{NewUser, User};

mod memory;
mod postgres;
mod users;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use users::{MemoryUserStore, PgUserStore};

/// Durable storage for conversion jobs.
///
/// Transition methods return `Ok(None)` when the job does not exist or its
/// current status does not allow the transition. Implementations must apply
/// each transition atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` job.
    async fn create(&self, input: &NewJob) -> Result<Job, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Job>, sqlx::Error>;

    /// Find a job only if it is owned by `user_id`.
    async fn find_owned(&self, id: DbId, user_id: DbId) -> Result<Option<Job>, sqlx::Error>;

    /// One page of the user's jobs, newest first, plus the total count.
    async fn list_owned(
        &self,
        user_id: DbId,
        page: &PageRequest,
    ) -> Result<(Vec<Job>, i64), sqlx::Error>;

    /// Enter (or re-enter) `Processing`. `started_at` is set on first entry
    /// only.
    async fn mark_processing(&self, id: DbId) -> Result<Option<Job>, sqlx::Error>;

    async fn mark_succeeded(&self, id: DbId, output_path: &str)
        -> Result<Option<Job>, sqlx::Error>;

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<Option<Job>, sqlx::Error>;

    /// Fail `Processing` jobs first started before `cutoff`. Keyed on
    /// `started_at`, so redeliveries re-entering `Processing` never extend
    /// the deadline.
    async fn fail_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Job>, sqlx::Error>;

    /// Jobs left `Pending` since before `cutoff`, oldest first.
    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, sqlx::Error>;

    /// Reset a job's staleness clock without changing its status.
    async fn touch(&self, id: DbId) -> Result<(), sqlx::Error>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), sqlx::Error>;
}

/// Storage for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Returns `Ok(None)` if the email is already taken.
    async fn create(&self, input: &NewUser) -> Result<Option<User>, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, sqlx::Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
}
