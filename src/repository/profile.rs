//! User profile repository: plan state, rename, daily counters.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewUserProfile, UserProfileRecord};
use super::parse_datetime_opt;
use super::pool::{DbError, DbPool};
use crate::models::{PlanStatus, UserProfile};
use crate::schema::user_profiles;

impl From<UserProfileRecord> for UserProfile {
    fn from(record: UserProfileRecord) -> Self {
        UserProfile {
            id: record.id as i64,
            user_id: record.user_id as i64,
            bestie_name: record.bestie_name,
            plan_status: PlanStatus::from_str(&record.plan_status)
                .unwrap_or(PlanStatus::Pending),
            trial_start_date: parse_datetime_opt(record.trial_start_date),
            plan_renews_at: parse_datetime_opt(record.plan_renews_at),
            gumroad_email: record.gumroad_email,
            gumroad_customer_id: record.gumroad_customer_id,
            daily_counter_date: record
                .daily_counter_date
                .as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
            daily_msg_count: record.daily_msg_count as i64,
            daily_link_count: record.daily_link_count as i64,
        }
    }
}

/// Repository for the 1:1 profile row behind each user.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: DbPool,
}

impl ProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the profile row if the user does not have one yet. New rows
    /// start on plan `pending` with today's counter date and zero counters.
    pub async fn ensure_exists(&self, user_id: i64) -> Result<(), DbError> {
        let today = Utc::now().date_naive().to_string();
        let new_profile = NewUserProfile {
            user_id: user_id as i32,
            plan_status: PlanStatus::Pending.as_str(),
            daily_counter_date: Some(&today),
            daily_msg_count: 0,
            daily_link_count: 0,
        };
        crate::with_conn!(self.pool, conn => {
            diesel::insert_into(user_profiles::table)
                .values(&new_profile)
                .on_conflict(user_profiles::user_id)
                .do_nothing()
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<UserProfile>, DbError> {
        crate::with_conn!(self.pool, conn => {
            user_profiles::table
                .filter(user_profiles::user_id.eq(user_id as i32))
                .first::<UserProfileRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(UserProfile::from))
        })
    }

    pub async fn set_bestie_name(&self, user_id: i64, name: &str) -> Result<(), DbError> {
        crate::with_conn!(self.pool, conn => {
            diesel::update(user_profiles::table.filter(user_profiles::user_id.eq(user_id as i32)))
                .set(user_profiles::bestie_name.eq(name))
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    /// Start a fresh counter day.
    pub async fn reset_daily_counters(&self, user_id: i64, day: NaiveDate) -> Result<(), DbError> {
        let day = day.to_string();
        crate::with_conn!(self.pool, conn => {
            diesel::update(user_profiles::table.filter(user_profiles::user_id.eq(user_id as i32)))
                .set((
                    user_profiles::daily_counter_date.eq(day.as_str()),
                    user_profiles::daily_msg_count.eq(0),
                    user_profiles::daily_link_count.eq(0),
                ))
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    /// Add to today's message and link counters.
    pub async fn bump_daily_counters(
        &self,
        user_id: i64,
        msg_delta: i64,
        link_delta: i64,
    ) -> Result<(), DbError> {
        crate::with_conn!(self.pool, conn => {
            diesel::update(user_profiles::table.filter(user_profiles::user_id.eq(user_id as i32)))
                .set((
                    user_profiles::daily_msg_count
                        .eq(user_profiles::daily_msg_count + msg_delta as i32),
                    user_profiles::daily_link_count
                        .eq(user_profiles::daily_link_count + link_delta as i32),
                ))
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    /// Apply a Gumroad sale to the profile. `trial_start` only lands when
    /// the profile has no trial start yet; the customer ID is kept when the
    /// sale does not carry one; the email always wins.
    pub async fn apply_plan_purchase(
        &self,
        user_id: i64,
        status: PlanStatus,
        trial_start: Option<DateTime<Utc>>,
        renews_at: DateTime<Utc>,
        email: &str,
        customer_id: Option<&str>,
    ) -> Result<(), DbError> {
        let existing = self.get(user_id).await?.ok_or(DbError::NotFound)?;

        let trial_start_date = existing
            .trial_start_date
            .or(trial_start)
            .map(|t| t.to_rfc3339());
        let customer = customer_id
            .map(str::to_string)
            .or(existing.gumroad_customer_id);
        let email = email.trim().to_lowercase();
        let renews = renews_at.to_rfc3339();

        crate::with_conn!(self.pool, conn => {
            diesel::update(user_profiles::table.filter(user_profiles::user_id.eq(user_id as i32)))
                .set((
                    user_profiles::plan_status.eq(status.as_str()),
                    user_profiles::trial_start_date.eq(trial_start_date.as_deref()),
                    user_profiles::plan_renews_at.eq(renews.as_str()),
                    user_profiles::gumroad_email.eq(email.as_str()),
                    user_profiles::gumroad_customer_id.eq(customer.as_deref()),
                ))
                .execute(&mut conn)
                .await
                .map(|_| ())
        })
    }

    /// Find the profile a Gumroad sale belongs to, by lowercased email.
    pub async fn find_by_gumroad_email(&self, email: &str) -> Result<Option<UserProfile>, DbError> {
        let email = email.trim().to_lowercase();
        crate::with_conn!(self.pool, conn => {
            user_profiles::table
                .filter(user_profiles::gumroad_email.eq(email.as_str()))
                .first::<UserProfileRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(UserProfile::from))
        })
    }

    /// Promote trials that started before `cutoff` to `active`, renewing at
    /// `renews_at`. Both are RFC 3339. Returns how many rows changed.
    pub async fn rollover_trials(&self, cutoff: &str, renews_at: &str) -> Result<usize, DbError> {
        crate::with_conn!(self.pool, conn => {
            diesel::update(
                user_profiles::table
                    .filter(user_profiles::plan_status.eq(PlanStatus::Trial.as_str()))
                    .filter(user_profiles::trial_start_date.lt(cutoff)),
            )
            .set((
                user_profiles::plan_status.eq(PlanStatus::Active.as_str()),
                user_profiles::plan_renews_at.eq(renews_at),
            ))
            .execute(&mut conn)
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::context::DbContext;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup() -> (DbContext, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let user = ctx
            .users()
            .get_or_create_by_phone("+15551260001")
            .await
            .unwrap();
        ctx.profiles().ensure_exists(user.id).await.unwrap();
        (ctx, dir, user.id)
    }

    #[tokio::test]
    async fn test_ensure_exists_idempotent_defaults() {
        let (ctx, _dir, user_id) = setup().await;
        let repo = ctx.profiles();
        repo.ensure_exists(user_id).await.unwrap();

        let profile = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.plan_status, PlanStatus::Pending);
        assert_eq!(profile.daily_msg_count, 0);
        assert_eq!(profile.daily_link_count, 0);
        assert_eq!(profile.daily_counter_date, Some(Utc::now().date_naive()));
        assert!(profile.bestie_name.is_none());
    }

    #[tokio::test]
    async fn test_counters_bump_and_reset() {
        let (ctx, _dir, user_id) = setup().await;
        let repo = ctx.profiles();

        repo.bump_daily_counters(user_id, 1, 0).await.unwrap();
        repo.bump_daily_counters(user_id, 1, 2).await.unwrap();
        let profile = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.daily_msg_count, 2);
        assert_eq!(profile.daily_link_count, 2);

        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        repo.reset_daily_counters(user_id, tomorrow).await.unwrap();
        let profile = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.daily_msg_count, 0);
        assert_eq!(profile.daily_counter_date, Some(tomorrow));
    }

    #[tokio::test]
    async fn test_apply_plan_purchase_coalesces_trial_start() {
        let (ctx, _dir, user_id) = setup().await;
        let repo = ctx.profiles();

        let first_start = Utc::now() - Duration::days(3);
        repo.apply_plan_purchase(
            user_id,
            PlanStatus::Trial,
            Some(first_start),
            Utc::now() + Duration::days(14),
            "Babe@Example.COM",
            Some("cust-1"),
        )
        .await
        .unwrap();

        let profile = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.plan_status, PlanStatus::Trial);
        assert_eq!(profile.gumroad_email.as_deref(), Some("babe@example.com"));
        assert_eq!(profile.gumroad_customer_id.as_deref(), Some("cust-1"));
        let stored_start = profile.trial_start_date.unwrap();

        // A second sale keeps the original trial start and the customer ID
        repo.apply_plan_purchase(
            user_id,
            PlanStatus::Active,
            Some(Utc::now()),
            Utc::now() + Duration::days(30),
            "babe@example.com",
            None,
        )
        .await
        .unwrap();

        let profile = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(profile.plan_status, PlanStatus::Active);
        assert_eq!(profile.trial_start_date, Some(stored_start));
        assert_eq!(profile.gumroad_customer_id.as_deref(), Some("cust-1"));
    }

    #[tokio::test]
    async fn test_find_by_gumroad_email() {
        let (ctx, _dir, user_id) = setup().await;
        let repo = ctx.profiles();
        repo.apply_plan_purchase(
            user_id,
            PlanStatus::Trial,
            Some(Utc::now()),
            Utc::now() + Duration::days(14),
            "finder@example.com",
            None,
        )
        .await
        .unwrap();

        let found = repo
            .find_by_gumroad_email("  FINDER@example.com ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(repo
            .find_by_gumroad_email("nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rollover_trials() {
        let (ctx, _dir, user_id) = setup().await;
        let repo = ctx.profiles();

        repo.apply_plan_purchase(
            user_id,
            PlanStatus::Trial,
            Some(Utc::now() - Duration::days(10)),
            Utc::now() + Duration::days(4),
            "old@example.com",
            None,
        )
        .await
        .unwrap();

        // Fresh trial on a second user stays put
        let fresh = ctx
            .users()
            .get_or_create_by_phone("+15551260002")
            .await
            .unwrap();
        repo.ensure_exists(fresh.id).await.unwrap();
        repo.apply_plan_purchase(
            fresh.id,
            PlanStatus::Trial,
            Some(Utc::now()),
            Utc::now() + Duration::days(14),
            "fresh@example.com",
            None,
        )
        .await
        .unwrap();

        let cutoff = (Utc::now() - Duration::days(7)).to_rfc3339();
        let renews = (Utc::now() + Duration::days(30)).to_rfc3339();
        let changed = repo.rollover_trials(&cutoff, &renews).await.unwrap();
        assert_eq!(changed, 1);

        let old = repo.get(user_id).await.unwrap().unwrap();
        assert_eq!(old.plan_status, PlanStatus::Active);
        let fresh_profile = repo.get(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_profile.plan_status, PlanStatus::Trial);
    }

    #[tokio::test]
    async fn test_cascade_with_user_delete() {
        let (ctx, _dir, user_id) = setup().await;
        assert!(ctx.users().delete(user_id).await.unwrap());
        assert!(ctx.profiles().get(user_id).await.unwrap().is_none());
    }
}
