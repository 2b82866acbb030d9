//! Diesel ORM models for database tables.
//!
//! These models provide compile-time type checking for database operations.
//! Timestamps are RFC 3339 TEXT on both backends; conversion to
//! `DateTime<Utc>` happens in the repositories.

use diesel::prelude::*;

use crate::schema;

/// User record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRecord {
    pub id: i32,
    pub phone: String,
    pub created_at: String,
}

/// New user for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::users)]
pub struct NewUser<'a> {
    pub phone: &'a str,
    pub created_at: &'a str,
}

/// Conversation record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::conversations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConversationRecord {
    pub id: i32,
    pub user_id: i32,
    pub started_at: String,
}

/// New conversation for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::conversations)]
pub struct NewConversation<'a> {
    pub user_id: i32,
    pub started_at: &'a str,
}

/// Message record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MessageRecord {
    pub id: i32,
    pub conversation_id: i32,
    pub direction: String,
    pub message_id: String,
    pub text: String,
    pub phone: Option<String>,
    pub created_at: String,
}

/// New message for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::messages)]
pub struct NewMessage<'a> {
    pub conversation_id: i32,
    pub direction: &'a str,
    pub message_id: &'a str,
    pub text: &'a str,
    pub phone: Option<&'a str>,
    pub created_at: &'a str,
}

/// Link record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::links)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LinkRecord {
    pub id: i32,
    pub conversation_id: i32,
    pub raw_url: String,
    pub affiliate_url: String,
    pub campaign: Option<String>,
    pub commission_pct: f64,
    pub sponsor_bid_cents: i32,
    pub last_ctr: f64,
    pub last_conv_rate: f64,
    pub created_at: String,
}

/// New link for insertion.
///
/// The numeric columns carry schema defaults of zero, so they are not
/// optional here; callers pass what they know.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::links)]
pub struct NewLink<'a> {
    pub conversation_id: i32,
    pub raw_url: &'a str,
    pub affiliate_url: &'a str,
    pub campaign: Option<&'a str>,
    pub commission_pct: f64,
    pub sponsor_bid_cents: i32,
    pub created_at: &'a str,
}

/// Click record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::clicks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClickRecord {
    pub id: i32,
    pub link_id: i32,
    pub user_id: i32,
    pub clicked_at: String,
}

/// New click for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::clicks)]
pub struct NewClick<'a> {
    pub link_id: i32,
    pub user_id: i32,
    pub clicked_at: &'a str,
}

/// Purchase record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::purchases)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PurchaseRecord {
    pub id: i32,
    pub link_id: i32,
    pub user_id: i32,
    pub amount_cents: i32,
    pub created_at: String,
}

/// New purchase for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::purchases)]
pub struct NewPurchase<'a> {
    pub link_id: i32,
    pub user_id: i32,
    pub amount_cents: i32,
    pub created_at: &'a str,
}

/// Error log record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::error_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ErrorLogRecord {
    pub id: i32,
    pub source: String,
    pub detail: String,
    pub created_at: String,
}

/// New error log row for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::error_log)]
pub struct NewErrorLog<'a> {
    pub source: &'a str,
    pub detail: &'a str,
    pub created_at: &'a str,
}

/// User profile record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::user_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserProfileRecord {
    pub id: i32,
    pub user_id: i32,
    pub bestie_name: Option<String>,
    pub plan_status: String,
    pub trial_start_date: Option<String>,
    pub plan_renews_at: Option<String>,
    pub gumroad_email: Option<String>,
    pub gumroad_customer_id: Option<String>,
    pub daily_counter_date: Option<String>,
    pub daily_msg_count: i32,
    pub daily_link_count: i32,
}

/// New user profile for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::user_profiles)]
pub struct NewUserProfile<'a> {
    pub user_id: i32,
    pub plan_status: &'a str,
    pub daily_counter_date: Option<&'a str>,
    pub daily_msg_count: i32,
    pub daily_link_count: i32,
}
