//! Work queue row.

use pixelforge_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `conversion_tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: DbId,
    pub task_name: String,
    pub payload: serde_json::Value,
    /// Claims so far, including one in flight.
    pub attempts: i32,
    pub last_attempt: Option<Timestamp>,
    pub created_at: Timestamp,
}
