//! Status event payloads.

use chrono::{DateTime, Utc};
use pixelforge_core::types::DbId;
use pixelforge_db::models::status::JobStatus;
use serde::{Deserialize, Serialize};

/// Coarse failure category exposed to job owners.
///
/// Raw error detail stays in the job record and is never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The uploaded source object could not be found.
    SourceMissing,
    /// The image could not be decoded or re-encoded.
    CodecError,
    /// Blob or record storage was unreachable on the final attempt.
    UpstreamUnavailable,
    /// The job sat in `PROCESSING` past the supervisor timeout.
    TimedOut,
}

/// A job status change.
///
/// Serialized as `{"type": "job_status", "job_id", "status", "timestamp",
/// "error_reason"?}`, which is exactly what a live client receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "job_status")]
pub struct StatusEvent {
    pub job_id: DbId,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<FailureReason>,
}

impl StatusEvent {
    pub fn new(job_id: DbId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            timestamp: Utc::now(),
            error_reason: None,
        }
    }

    pub fn failed(job_id: DbId, reason: FailureReason) -> Self {
        Self {
            error_reason: Some(reason),
            ..Self::new(job_id, JobStatus::Failed)
        }
    }

    /// Wrap this event for the fan-out bus.
    pub fn to_fanout(&self) -> Result<FanoutMessage, serde_json::Error> {
        Ok(FanoutMessage {
            job_id: self.job_id,
            message: serde_json::to_value(self)?,
        })
    }
}

/// Envelope carried on the fan-out bus.
///
/// `message` is forwarded verbatim to every live connection subscribed to
/// `job_id`; the registry never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanoutMessage {
    pub job_id: DbId,
    pub message: serde_json::Value,
}
