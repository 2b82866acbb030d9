//! User repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewUser, UserRecord};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::User;
use crate::phone::normalize_phone;
use crate::schema::users;

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id as i64,
            phone: record.phone,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Repository for user rows.
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a user by ID.
    pub async fn get(&self, id: i64) -> Result<Option<User>, DbError> {
        crate::with_conn!(self.pool, conn => {
            users::table
                .find(id as i32)
                .first::<UserRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(User::from))
        })
    }

    /// Get a user by exact phone string.
    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<User>, DbError> {
        crate::with_conn!(self.pool, conn => {
            users::table
                .filter(users::phone.eq(phone))
                .first::<UserRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(User::from))
        })
    }

    /// Idempotent fetch-or-create by phone.
    ///
    /// Looks up the normalized number first, then the raw input so legacy
    /// unnormalized rows still match; matching legacy rows are rewritten to
    /// the normalized form in place.
    pub async fn get_or_create_by_phone(&self, phone: &str) -> Result<User, DbError> {
        let norm = normalize_phone(phone).unwrap_or_else(|| phone.to_string());

        if let Some(user) = self.get_by_phone(&norm).await? {
            return Ok(user);
        }

        if let Some(user) = self.get_by_phone(phone).await? {
            if user.phone != norm {
                // Best effort; if another row already owns the normalized
                // number the unique constraint keeps this one as-is
                let _ = crate::with_conn!(self.pool, conn => {
                    diesel::update(users::table.find(user.id as i32))
                        .set(users::phone.eq(&norm))
                        .execute(&mut conn)
                        .await
                });
            }
            return Ok(User {
                phone: norm,
                ..user
            });
        }

        let now = Utc::now().to_rfc3339();
        let new_user = NewUser {
            phone: &norm,
            created_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(users::table)
                .values(&new_user)
                .on_conflict(users::phone)
                .do_nothing()
                .execute(&mut conn)
                .await
        })?;

        // Re-fetch: either our row or one a concurrent insert won with
        match self.get_by_phone(&norm).await? {
            Some(user) => Ok(user),
            None => Err(DbError::NotFound),
        }
    }

    /// Total number of users.
    pub async fn count(&self) -> Result<i64, DbError> {
        crate::with_conn!(self.pool, conn => {
            users::table.count().get_result::<i64>(&mut conn).await
        })
    }

    /// Delete a user. Cascades to conversations, clicks, purchases and the
    /// profile via the schema.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        crate::with_conn!(self.pool, conn => {
            diesel::delete(users::table.find(id as i32))
                .execute(&mut conn)
                .await
                .map(|rows| rows > 0)
        })
    }
}
