//! Append-only failure log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded failure. No foreign keys; rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Database row ID.
    pub id: i64,
    /// Where the failure came from (job kind, handler name).
    pub source: String,
    /// Error detail, usually the Display form of the error.
    pub detail: String,
    /// When the failure was recorded.
    pub created_at: DateTime<Utc>,
}
