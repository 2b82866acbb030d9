//! Message rows and direction handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way a message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            _ => None,
        }
    }
}

/// A single SMS, inbound or outbound.
///
/// `message_id` is the provider's external id (or a generated UUID for
/// outbound parts) and is unique, which is what makes webhook retries
/// idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Database row ID.
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: i64,
    /// Inbound or outbound.
    pub direction: Direction,
    /// External or generated message id (unique).
    pub message_id: String,
    /// Message body.
    pub text: String,
    /// Sender/recipient phone, when known.
    pub phone: Option<String>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}
