use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Missing entity. Also used when the caller does not own the entity so
    /// that ownership is never leaked.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The requested artifact exists but has not been produced yet.
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Blob store, queue or codec unavailable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
