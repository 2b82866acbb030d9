//! Conversation repository.

use chrono::Utc;
use diesel::dsl::{exists, not};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{ConversationRecord, NewConversation};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::{Conversation, Direction};
use crate::schema::{conversations, messages};

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Conversation {
            id: record.id as i64,
            user_id: record.user_id as i64,
            started_at: parse_datetime(&record.started_at),
        }
    }
}

/// Repository for conversation threads.
#[derive(Clone)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a conversation by ID.
    pub async fn get(&self, id: i64) -> Result<Option<Conversation>, DbError> {
        crate::with_conn!(self.pool, conn => {
            conversations::table
                .find(id as i32)
                .first::<ConversationRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Conversation::from))
        })
    }

    /// Most recent conversation for a user, if any.
    pub async fn latest_for_user(&self, user_id: i64) -> Result<Option<Conversation>, DbError> {
        crate::with_conn!(self.pool, conn => {
            conversations::table
                .filter(conversations::user_id.eq(user_id as i32))
                .order((conversations::started_at.desc(), conversations::id.desc()))
                .first::<ConversationRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Conversation::from))
        })
    }

    /// Return the most recent conversation for a user, creating one if none
    /// exists yet.
    pub async fn get_or_create_latest(&self, user_id: i64) -> Result<Conversation, DbError> {
        if let Some(convo) = self.latest_for_user(user_id).await? {
            return Ok(convo);
        }

        let now = Utc::now().to_rfc3339();
        let new_convo = NewConversation {
            user_id: user_id as i32,
            started_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(conversations::table)
                .values(&new_convo)
                .execute(&mut conn)
                .await
        })?;

        match self.latest_for_user(user_id).await? {
            Some(convo) => Ok(convo),
            None => Err(DbError::NotFound),
        }
    }

    /// Conversations with history but no inbound message newer than
    /// `cutoff` (RFC 3339). Outbound traffic does not count as activity,
    /// so a nudge does not pull a ghosting user out of the sweep.
    pub async fn find_quiet_since(&self, cutoff: &str) -> Result<Vec<Conversation>, DbError> {
        crate::with_conn!(self.pool, conn => {
            conversations::table
                .filter(exists(
                    messages::table.filter(messages::conversation_id.eq(conversations::id)),
                ))
                .filter(not(exists(
                    messages::table
                        .filter(messages::conversation_id.eq(conversations::id))
                        .filter(messages::direction.eq(Direction::In.as_str()))
                        .filter(messages::created_at.gt(cutoff.to_string())),
                )))
                .load::<ConversationRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Conversation::from).collect())
        })
    }

    /// Total number of conversations.
    pub async fn count(&self) -> Result<i64, DbError> {
        crate::with_conn!(self.pool, conn => {
            conversations::table.count().get_result::<i64>(&mut conn).await
        })
    }

    /// Delete a conversation. Cascades to messages and links via the schema.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        crate::with_conn!(self.pool, conn => {
            diesel::delete(conversations::table.find(id as i32))
                .execute(&mut conn)
                .await
                .map(|rows| rows > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::context::DbContext;
    use tempfile::tempdir;

    async fn setup() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    #[tokio::test]
    async fn test_get_or_create_latest_reuses() {
        let (ctx, _dir) = setup().await;
        let user = ctx
            .users()
            .get_or_create_by_phone("+15551230001")
            .await
            .unwrap();

        let repo = ctx.conversations();
        let a = repo.get_or_create_latest(user.id).await.unwrap();
        let b = repo.get_or_create_latest(user.id).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.user_id, user.id);
    }

    #[tokio::test]
    async fn test_find_quiet_since() {
        let (ctx, _dir) = setup().await;
        let user = ctx
            .users()
            .get_or_create_by_phone("+15551230002")
            .await
            .unwrap();
        let convo = ctx
            .conversations()
            .get_or_create_latest(user.id)
            .await
            .unwrap();

        // No messages at all: not considered quiet (never active)
        let quiet = ctx
            .conversations()
            .find_quiet_since(&Utc::now().to_rfc3339())
            .await
            .unwrap();
        assert!(quiet.is_empty());

        ctx.messages()
            .insert(convo.id, crate::models::Direction::In, "m-quiet-1", "hey", None)
            .await
            .unwrap();

        // Message is older than a future cutoff
        let future = (Utc::now() + chrono::Duration::seconds(5)).to_rfc3339();
        let quiet = ctx.conversations().find_quiet_since(&future).await.unwrap();
        assert_eq!(quiet.len(), 1);
        assert_eq!(quiet[0].id, convo.id);

        // But not older than a past cutoff
        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let quiet = ctx.conversations().find_quiet_since(&past).await.unwrap();
        assert!(quiet.is_empty());

        // Outbound traffic does not reset the quiet clock
        ctx.messages()
            .insert(convo.id, crate::models::Direction::Out, "m-quiet-2", "nudge", None)
            .await
            .unwrap();
        let quiet = ctx.conversations().find_quiet_since(&future).await.unwrap();
        assert_eq!(quiet.len(), 1);
        assert_eq!(quiet[0].id, convo.id);
    }
}
