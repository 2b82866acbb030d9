//! Conversation threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message thread belonging to a user. Messages and links hang off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Database row ID.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// When the thread was opened.
    pub started_at: DateTime<Utc>,
}
