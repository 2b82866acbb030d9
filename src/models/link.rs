//! Affiliate links and their click/purchase attribution rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A wrapped affiliate link sent in a conversation.
///
/// The numeric columns (`commission_pct`, `sponsor_bid_cents`, `last_ctr`,
/// `last_conv_rate`) default to zero at the schema level so ranking math
/// never has to deal with NULLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Database row ID.
    pub id: i64,
    /// Conversation the link was sent in.
    pub conversation_id: i64,
    /// URL before affiliate wrapping.
    pub raw_url: String,
    /// URL as actually sent.
    pub affiliate_url: String,
    /// Campaign tag, if any.
    pub campaign: Option<String>,
    /// Merchant commission percentage.
    pub commission_pct: f64,
    /// Sponsor bid in cents.
    pub sponsor_bid_cents: i64,
    /// Last observed click-through rate.
    pub last_ctr: f64,
    /// Last observed conversion rate.
    pub last_conv_rate: f64,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// A recorded click on a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Click {
    /// Database row ID.
    pub id: i64,
    /// Link that was clicked.
    pub link_id: i64,
    /// User who clicked.
    pub user_id: i64,
    /// When the click happened.
    pub clicked_at: DateTime<Utc>,
}

/// A recorded purchase attributed to a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Database row ID.
    pub id: i64,
    /// Link that drove the purchase.
    pub link_id: i64,
    /// User who purchased.
    pub user_id: i64,
    /// Purchase amount in cents.
    pub amount_cents: i64,
    /// When the purchase was recorded.
    pub created_at: DateTime<Utc>,
}
