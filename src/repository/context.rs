//! Database context for managing connections and repository access.
//!
//! The DbContext is the primary entry point for all database operations.
//! It holds the connection pool and provides access to all repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::conversation::ConversationRepository;
use super::error_log::ErrorLogRepository;
use super::link::LinkRepository;
use super::message::MessageRepository;
use super::pool::{DbError, DbPool};
use super::profile::ProfileRepository;
use super::user::UserRepository;

/// Database context that manages the connection pool and provides repository access.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:/var/lib/bestie/bestie.db", 5, 10)?;
/// let user = ctx.users().get_or_create_by_phone("+15551234567").await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database file path (SQLite only).
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(db_path),
        }
    }

    /// Create a context from a database URL.
    ///
    /// Supports:
    /// - SQLite: file paths or `sqlite:` URLs
    /// - PostgreSQL: `postgres://` or `postgresql://` URLs
    pub fn from_url(url: &str, pg_pool_size: usize, pool_timeout_secs: u64) -> Result<Self, DbError> {
        Ok(Self {
            pool: DbPool::from_url(url, pg_pool_size, pool_timeout_secs)?,
        })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Check if using SQLite backend.
    pub fn is_sqlite(&self) -> bool {
        self.pool.is_sqlite()
    }

    /// Check if using PostgreSQL backend.
    #[cfg(feature = "postgres")]
    pub fn is_postgres(&self) -> bool {
        self.pool.is_postgres()
    }

    /// Get a user repository.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Get a conversation repository.
    pub fn conversations(&self) -> ConversationRepository {
        ConversationRepository::new(self.pool.clone())
    }

    /// Get a message repository.
    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.pool.clone())
    }

    /// Get a link repository.
    pub fn links(&self) -> LinkRepository {
        LinkRepository::new(self.pool.clone())
    }

    /// Get a user profile repository.
    pub fn profiles(&self) -> ProfileRepository {
        ProfileRepository::new(self.pool.clone())
    }

    /// Get an error log repository.
    pub fn errors(&self) -> ErrorLogRepository {
        ErrorLogRepository::new(self.pool.clone())
    }

    /// Initialize database schema.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        crate::with_conn_split!(self.pool,
            sqlite: conn => {
                init_sqlite_schema(&mut conn).await
            },
            postgres: conn => {
                init_postgres_schema(&mut conn).await
            }
        )
    }
}

/// Initialize SQLite schema.
async fn init_sqlite_schema(conn: &mut super::pool::SqliteConn) -> Result<(), DbError> {
    conn.batch_execute(include_str!("schema_sqlite.sql")).await
}

/// Initialize PostgreSQL schema.
#[cfg(feature = "postgres")]
async fn init_postgres_schema(conn: &mut diesel_async::AsyncPgConnection) -> Result<(), DbError> {
    use diesel_async::RunQueryDsl;

    // PostgreSQL needs statements executed separately; comment lines are
    // stripped so a header comment does not swallow the first statement.
    let statements = include_str!("schema_postgres.sql");
    for stmt in statements.split(';') {
        let stmt = stmt
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let stmt = stmt.trim();
        if !stmt.is_empty() {
            diesel::sql_query(stmt).execute(conn).await?;
        }
    }
    Ok(())
}
