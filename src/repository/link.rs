//! Affiliate link repository, plus click and purchase tracking.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{
    ClickRecord, LinkRecord, NewClick, NewLink, NewPurchase, PurchaseRecord,
};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::{Click, Link, Purchase};
use crate::schema::{clicks, links, purchases};

impl From<LinkRecord> for Link {
    fn from(record: LinkRecord) -> Self {
        Link {
            id: record.id as i64,
            conversation_id: record.conversation_id as i64,
            raw_url: record.raw_url,
            affiliate_url: record.affiliate_url,
            campaign: record.campaign,
            commission_pct: record.commission_pct,
            sponsor_bid_cents: record.sponsor_bid_cents as i64,
            last_ctr: record.last_ctr,
            last_conv_rate: record.last_conv_rate,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

impl From<ClickRecord> for Click {
    fn from(record: ClickRecord) -> Self {
        Click {
            id: record.id as i64,
            link_id: record.link_id as i64,
            user_id: record.user_id as i64,
            clicked_at: parse_datetime(&record.clicked_at),
        }
    }
}

impl From<PurchaseRecord> for Purchase {
    fn from(record: PurchaseRecord) -> Self {
        Purchase {
            id: record.id as i64,
            link_id: record.link_id as i64,
            user_id: record.user_id as i64,
            amount_cents: record.amount_cents as i64,
            created_at: parse_datetime(&record.created_at),
        }
    }
}

/// Repository for wrapped affiliate links and their outcome events.
#[derive(Clone)]
pub struct LinkRepository {
    pool: DbPool,
}

impl LinkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a wrapped link sent on a conversation. CTR and conversion
    /// rate columns start at zero and are backfilled by analytics.
    pub async fn insert(
        &self,
        conversation_id: i64,
        raw_url: &str,
        affiliate_url: &str,
        campaign: Option<&str>,
        commission_pct: f64,
        sponsor_bid_cents: i64,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let new_link = NewLink {
            conversation_id: conversation_id as i32,
            raw_url,
            affiliate_url,
            campaign,
            commission_pct,
            sponsor_bid_cents: sponsor_bid_cents as i32,
            created_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(links::table)
                .values(&new_link)
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Link>, DbError> {
        crate::with_conn!(self.pool, conn => {
            links::table
                .find(id as i32)
                .first::<LinkRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Link::from))
        })
    }

    /// Total number of tracked links.
    pub async fn count(&self) -> Result<i64, DbError> {
        crate::with_conn!(self.pool, conn => {
            links::table.count().get_result::<i64>(&mut conn).await
        })
    }

    /// Links recorded on a conversation, newest first.
    pub async fn list_for_conversation(&self, conversation_id: i64) -> Result<Vec<Link>, DbError> {
        crate::with_conn!(self.pool, conn => {
            links::table
                .filter(links::conversation_id.eq(conversation_id as i32))
                .order((links::created_at.desc(), links::id.desc()))
                .load::<LinkRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Link::from).collect())
        })
    }

    pub async fn record_click(&self, link_id: i64, user_id: i64) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let new_click = NewClick {
            link_id: link_id as i32,
            user_id: user_id as i32,
            clicked_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(clicks::table)
                .values(&new_click)
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    pub async fn record_purchase(
        &self,
        link_id: i64,
        user_id: i64,
        amount_cents: i64,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let new_purchase = NewPurchase {
            link_id: link_id as i32,
            user_id: user_id as i32,
            amount_cents: amount_cents as i32,
            created_at: &now,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(purchases::table)
                .values(&new_purchase)
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    pub async fn clicks_for_link(&self, link_id: i64) -> Result<Vec<Click>, DbError> {
        crate::with_conn!(self.pool, conn => {
            clicks::table
                .filter(clicks::link_id.eq(link_id as i32))
                .order(clicks::clicked_at.asc())
                .load::<ClickRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Click::from).collect())
        })
    }

    pub async fn purchases_for_link(&self, link_id: i64) -> Result<Vec<Purchase>, DbError> {
        crate::with_conn!(self.pool, conn => {
            purchases::table
                .filter(purchases::link_id.eq(link_id as i32))
                .order(purchases::created_at.asc())
                .load::<PurchaseRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Purchase::from).collect())
        })
    }
}
