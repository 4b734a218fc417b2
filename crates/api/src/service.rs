//! The Job Service: submit, status, list and download.
//!
//! Handlers stay thin and delegate here. The service talks to its
//! collaborators only through their traits, so the same code runs against
//! Postgres/S3 in production and the in-memory implementations in tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pixelforge_core::error::CoreError;
use pixelforge_core::formats::ImageFormat;
use pixelforge_core::keys::{download_filename, generate_upload_key};
use pixelforge_core::pagination::{Page, PageRequest};
use pixelforge_core::types::DbId;
use pixelforge_db::models::job::{Job, NewJob};
use pixelforge_db::models::status::JobStatus;
use pixelforge_db::queue::{ConvertImageTask, TaskQueue};
use pixelforge_db::store::JobStore;
use pixelforge_storage::{BlobGateway, BlobKind};

use crate::error::{AppError, AppResult};
use crate::response::DownloadHandle;

pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobGateway>,
    download_ttl: Duration,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobGateway>,
        download_ttl: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            blobs,
            download_ttl,
        }
    }

    /// Accept an upload and schedule its conversion.
    ///
    /// Nothing is written unless both the target format and the source
    /// extension are supported. The blob is stored and the row committed
    /// before the task is enqueued, so a worker that dequeues immediately
    /// always finds both. If the enqueue itself fails the job is still
    /// returned: it stays `PENDING` and the worker's supervisor re-enqueues
    /// it.
    pub async fn submit(
        &self,
        user_id: DbId,
        filename: &str,
        bytes: Bytes,
        target_format: &str,
    ) -> AppResult<Job> {
        let target = ImageFormat::from_extension(target_format)?;
        let filename = base_name(filename);
        let source = ImageFormat::from_filename(filename)?;
        if bytes.is_empty() {
            return Err(CoreError::Validation("uploaded file is empty".into()).into());
        }

        let input_path = generate_upload_key(source);
        self.blobs
            .put(BlobKind::Upload, &input_path, bytes, source.mime_type())
            .await
            .map_err(upstream)?;

        let job = self
            .store
            .create(&NewJob {
                user_id,
                filename: filename.to_string(),
                input_path,
                original_format: source,
                target_format: target,
            })
            .await?;

        match self
            .queue
            .enqueue(&ConvertImageTask::new(job.id).to_message())
            .await
        {
            Ok(task_id) => {
                tracing::info!(
                    job_id = job.id,
                    task_id,
                    user_id,
                    source = %source,
                    target = %target,
                    "Conversion job submitted",
                );
            }
            Err(e) => {
                tracing::warn!(
                    job_id = job.id,
                    error = %e,
                    "Enqueue failed; job left pending for the supervisor",
                );
            }
        }

        Ok(job)
    }

    /// Fetch a job owned by `user_id`.
    ///
    /// A job owned by someone else is reported exactly like a missing one.
    pub async fn get_status(&self, job_id: DbId, user_id: DbId) -> AppResult<Job> {
        self.store
            .find_owned(job_id, user_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            }))
    }

    /// One page of the user's jobs, newest first.
    ///
    /// `link` renders the URL of another page of the same listing.
    pub async fn list(
        &self,
        user_id: DbId,
        request: PageRequest,
        link: impl Fn(i64, i64) -> String,
    ) -> AppResult<Page<Job>> {
        let (jobs, total) = self.store.list_owned(user_id, &request).await?;
        Ok(Page::new(request, total, jobs, link))
    }

    /// Sign a short-lived URL for a finished conversion.
    pub async fn get_download(&self, job_id: DbId, user_id: DbId) -> AppResult<DownloadHandle> {
        let job = self.get_status(job_id, user_id).await?;

        let output_path = match (job.status, job.output_path.as_deref()) {
            (JobStatus::Success, Some(path)) => path,
            (status, _) => {
                return Err(CoreError::NotReady(format!(
                    "job {job_id} is {}, output is not available",
                    status.name()
                ))
                .into());
            }
        };

        let signed = self
            .blobs
            .sign(BlobKind::Converted, output_path, self.download_ttl)
            .await
            .map_err(upstream)?;

        Ok(DownloadHandle {
            url: signed.url,
            filename: download_filename(&job.filename, job.target_format),
            expires_at: signed.expires_at,
        })
    }

    /// Check the record store, for the health endpoint.
    pub async fn store_healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

fn upstream(err: impl fmt::Display) -> AppError {
    AppError::Core(CoreError::UpstreamUnavailable(err.to_string()))
}

/// Strip any client-side directory components from an uploaded filename.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}
