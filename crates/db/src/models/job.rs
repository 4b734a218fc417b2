//! Conversion job entity and DTOs.

use pixelforge_core::formats::ImageFormat;
use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
///
/// `status` and both formats are decoded through `TryFrom`, so a row holding
/// an unknown value fails to load instead of leaking into the domain.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub user_id: DbId,
    pub filename: String,
    pub input_path: String,
    pub output_path: Option<String>,
    #[sqlx(try_from = "String")]
    pub original_format: ImageFormat,
    #[sqlx(try_from = "String")]
    pub target_format: ImageFormat,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: JobStatus,
    /// Internal failure detail. Never serialized to clients.
    #[serde(skip_serializing)]
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    #[serde(skip_serializing)]
    pub updated_at: Timestamp,
}

impl Job {
    /// Check the record invariants: `output_path` is set iff the job
    /// succeeded, `finished_at` iff it is terminal, and `started_at` once it
    /// has left `Pending`.
    pub fn invariants_hold(&self) -> bool {
        let output_ok = self.output_path.is_some() == (self.status == JobStatus::Success);
        let finished_ok = self.finished_at.is_some() == self.status.is_terminal();
        let started_ok = self.status == JobStatus::Pending || self.started_at.is_some();
        output_ok && finished_ok && started_ok
    }
}

/// Insert DTO used by the Job Service when a conversion is submitted.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: DbId,
    pub filename: String,
    pub input_path: String,
    pub original_format: ImageFormat,
    pub target_format: ImageFormat,
}

/// Status read model returned by `GET /jobs/status/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub id: DbId,
    pub status: JobStatus,
    pub user_id: DbId,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            user_id: job.user_id,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
