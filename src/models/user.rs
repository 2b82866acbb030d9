//! User accounts keyed by phone number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscriber, identified by their E.164 phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Database row ID.
    pub id: i64,
    /// Normalized phone number (unique).
    pub phone: String,
    /// When the user was first seen.
    pub created_at: DateTime<Utc>,
}
