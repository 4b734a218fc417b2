//! The Conversion Worker: drives one job through its state machine.
//!
//! The worker never trusts task contents beyond the job id. Every step
//! re-reads or conditionally updates the record through the [`JobStore`],
//! so redelivered tasks are safe to run again.

use std::sync::Arc;

use pixelforge_core::keys::converted_key;
use pixelforge_core::types::DbId;
use pixelforge_db::models::status::JobStatus;
use pixelforge_db::store::JobStore;
use pixelforge_events::StatusEvent;
use pixelforge_storage::{BlobGateway, BlobKind};

use crate::codec;
use crate::error::ConversionError;
use crate::publisher::StatusPublisher;

/// Result of a conversion attempt that needs no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The job reached `SUCCESS` with this output key.
    Succeeded { output_path: String },
    /// Nothing to do: the job is missing or already terminal.
    Skipped,
}

pub struct ConversionWorker {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobGateway>,
    publisher: StatusPublisher,
}

impl ConversionWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobGateway>,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            store,
            blobs,
            publisher,
        }
    }

    /// Run one attempt for `job_id`.
    ///
    /// On error the job is committed as `FAILED` unless the error is
    /// retryable and this is not the `final_attempt`, in which case it is
    /// left `PROCESSING` for the next delivery.
    pub async fn process(
        &self,
        job_id: DbId,
        final_attempt: bool,
    ) -> Result<Outcome, ConversionError> {
        match self.convert(job_id).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_retryable() && !final_attempt => {
                tracing::warn!(job_id, error = %err, "Conversion attempt failed, will retry");
                Err(err)
            }
            Err(err) => {
                self.fail(job_id, &err).await;
                Err(err)
            }
        }
    }

    async fn convert(&self, job_id: DbId) -> Result<Outcome, ConversionError> {
        let Some(job) = self.store.find_by_id(job_id).await? else {
            tracing::warn!(job_id, "Job not found, dropping task");
            return Ok(Outcome::Skipped);
        };
        if job.status.is_terminal() {
            tracing::info!(job_id, status = job.status.name(), "Job already finished, skipping");
            return Ok(Outcome::Skipped);
        }

        let Some(job) = self.store.mark_processing(job_id).await? else {
            tracing::info!(job_id, "Job left PROCESSING concurrently, skipping");
            return Ok(Outcome::Skipped);
        };
        tracing::info!(
            job_id,
            from = %job.original_format,
            to = %job.target_format,
            "Job processing",
        );
        self.publisher
            .publish(StatusEvent::new(job_id, JobStatus::Processing))
            .await;

        let source = self.blobs.get(BlobKind::Upload, &job.input_path).await?;
        let converted = codec::convert(source, job.original_format, job.target_format).await?;

        let output_path = converted_key(&job.input_path, job.target_format);
        self.blobs
            .put(
                BlobKind::Converted,
                &output_path,
                converted,
                job.target_format.mime_type(),
            )
            .await?;

        match self.store.mark_succeeded(job_id, &output_path).await? {
            Some(_) => {
                tracing::info!(job_id, output_path = %output_path, "Job succeeded");
                self.publisher
                    .publish(StatusEvent::new(job_id, JobStatus::Success))
                    .await;
                Ok(Outcome::Succeeded { output_path })
            }
            None => {
                tracing::warn!(job_id, "Job was finished elsewhere before success commit");
                Ok(Outcome::Skipped)
            }
        }
    }

    async fn fail(&self, job_id: DbId, err: &ConversionError) {
        match self.store.mark_failed(job_id, &err.to_string()).await {
            Ok(Some(_)) => {
                tracing::error!(job_id, error = %err, "Job failed");
                self.publisher
                    .publish(StatusEvent::failed(job_id, err.failure_reason()))
                    .await;
            }
            Ok(None) => {
                tracing::warn!(job_id, error = %err, "Job could not be marked failed from its current state");
            }
            Err(e) => {
                tracing::error!(
                    job_id,
                    error = %e,
                    cause = %err,
                    "Failed to record job failure; supervisor will time it out",
                );
            }
        }
    }
}
