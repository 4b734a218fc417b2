use pixelforge_db::queue::QueueError;
use pixelforge_events::FailureReason;
use pixelforge_storage::BlobError;

use crate::codec::CodecError;

/// Why a conversion attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("source object '{0}' is missing")]
    SourceMissing(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Blob(BlobError),

    #[error("job store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<BlobError> for ConversionError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound { key, .. } => Self::SourceMissing(key),
            other => Self::Blob(other),
        }
    }
}

impl ConversionError {
    /// Whether another attempt could succeed. Bad input never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceMissing(_) | Self::Codec(_) => false,
            Self::Blob(_) | Self::Store(_) => true,
        }
    }

    /// Category reported to the job owner.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::SourceMissing(_) => FailureReason::SourceMissing,
            Self::Codec(_) => FailureReason::CodecError,
            Self::Blob(_) | Self::Store(_) => FailureReason::UpstreamUnavailable,
        }
    }
}

/// Failure of a supervisor sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("job store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
