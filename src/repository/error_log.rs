//! Error log repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{ErrorLogRecord, NewErrorLog};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::ErrorEntry;
use crate::schema::error_log;

impl From<ErrorLogRecord> for ErrorEntry {
    fn from(record: ErrorLogRecord) -> Self {
        ErrorEntry {
            id: record.id as i64,
            source: record.source,
            detail: record.detail,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Repository for operational failures worth keeping.
#[derive(Clone)]
pub struct ErrorLogRepository {
    pool: DbPool,
}

impl ErrorLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a failure row. `source` names the job kind or handler.
    pub async fn insert(&self, source: &str, detail: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let entry = NewErrorLog {
            source,
            detail,
            created_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(error_log::table)
                .values(&entry)
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    /// Most recent failures, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<ErrorEntry>, DbError> {
        crate::with_conn!(self.pool, conn => {
            error_log::table
                .order((error_log::created_at.desc(), error_log::id.desc()))
                .limit(limit)
                .load::<ErrorLogRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ErrorEntry::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::context::DbContext;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_insert_and_recent() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let repo = ctx.errors();
        repo.insert("generate_reply", "redis timed out").await.unwrap();
        repo.insert("webhook", "store failed").await.unwrap();
        repo.insert("generate_reply", "send failed").await.unwrap();

        let recent = repo.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].source, "generate_reply");
        assert_eq!(recent[0].detail, "send failed");
    }
}
