//! Message repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{MessageRecord, NewMessage};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::{Direction, Message};
use crate::schema::messages;

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            id: record.id as i64,
            conversation_id: record.conversation_id as i64,
            direction: Direction::from_str(&record.direction).unwrap_or(Direction::In),
            message_id: record.message_id,
            text: record.text,
            phone: record.phone,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Repository for SMS messages.
#[derive(Clone)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a message. Returns false when the provider message ID was
    /// already stored, which is how webhook redelivery gets deduplicated.
    pub async fn insert(
        &self,
        conversation_id: i64,
        direction: Direction,
        message_id: &str,
        text: &str,
        phone: Option<&str>,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let new_message = NewMessage {
            conversation_id: conversation_id as i32,
            direction: direction.as_str(),
            message_id,
            text,
            phone,
            created_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(messages::table)
                .values(&new_message)
                .on_conflict(messages::message_id)
                .do_nothing()
                .execute(&mut conn)
                .await
                .map(|rows| rows > 0)
        })
    }

    /// Fetch a message by provider message ID.
    pub async fn get_by_message_id(&self, message_id: &str) -> Result<Option<Message>, DbError> {
        crate::with_conn!(self.pool, conn => {
            messages::table
                .filter(messages::message_id.eq(message_id))
                .first::<MessageRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Message::from))
        })
    }

    /// All messages in a conversation, oldest first.
    pub async fn list_for_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, DbError> {
        crate::with_conn!(self.pool, conn => {
            messages::table
                .filter(messages::conversation_id.eq(conversation_id as i32))
                .order((messages::created_at.asc(), messages::id.asc()))
                .load::<MessageRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Message::from).collect())
        })
    }

    /// Total number of messages across all conversations.
    pub async fn count(&self) -> Result<i64, DbError> {
        crate::with_conn!(self.pool, conn => {
            messages::table.count().get_result::<i64>(&mut conn).await
        })
    }

    /// Number of messages stored for a conversation.
    pub async fn count_for_conversation(&self, conversation_id: i64) -> Result<i64, DbError> {
        crate::with_conn!(self.pool, conn => {
            messages::table
                .filter(messages::conversation_id.eq(conversation_id as i32))
                .count()
                .get_result::<i64>(&mut conn)
                .await
        })
    }

    /// When we last sent anything on this conversation. Gates nudge cadence.
    pub async fn latest_outbound_at(
        &self,
        conversation_id: i64,
    ) -> Result<Option<DateTime<Utc>>, DbError> {
        let record: Option<MessageRecord> = crate::with_conn!(self.pool, conn => {
            messages::table
                .filter(messages::conversation_id.eq(conversation_id as i32))
                .filter(messages::direction.eq(Direction::Out.as_str()))
                .order((messages::created_at.desc(), messages::id.desc()))
                .first::<MessageRecord>(&mut conn)
                .await
                .optional()
        })?;
        Ok(record.map(|r| parse_datetime(&r.created_at)))
    }
}
