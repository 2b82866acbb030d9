//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking.
//! Supports both SQLite and PostgreSQL backends.

pub mod context;
pub mod models;
pub mod pool;

// Repositories, one per table family
pub mod conversation;
pub mod error_log;
pub mod link;
pub mod message;
pub mod profile;
pub mod user;

// Utilities
pub mod util;

// Re-export main types (may be unused in main binary but are public API)
#[allow(unused_imports)]
pub use context::DbContext;
#[allow(unused_imports)]
pub use pool::{DbError, DbPool};

#[allow(unused_imports)]
pub use conversation::ConversationRepository;
#[allow(unused_imports)]
pub use error_log::ErrorLogRepository;
#[allow(unused_imports)]
pub use link::LinkRepository;
#[allow(unused_imports)]
pub use message::MessageRepository;
#[allow(unused_imports)]
pub use profile::ProfileRepository;
#[allow(unused_imports)]
pub use user::UserRepository;

// Re-export models (public API)
#[allow(unused_imports)]
pub use models::{
    ClickRecord, ConversationRecord, ErrorLogRecord, LinkRecord, MessageRecord, NewClick,
    NewConversation, NewErrorLog, NewLink, NewMessage, NewPurchase, NewUser, NewUserProfile,
    PurchaseRecord, UserProfileRecord, UserRecord,
};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
