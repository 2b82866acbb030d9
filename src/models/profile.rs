//! Per-user profile: plan state, rename, daily counters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan state.
///
/// `pending` is a user who has texted but never signed up; `intro` is the
/// free taste before the paywall; `trial` and `active` come from Gumroad
/// webhooks; `expired` and `canceled` are blocked at the plan gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Intro,
    Trial,
    Active,
    Expired,
    Canceled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Intro => "intro",
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "intro" => Some(Self::Intro),
            "trial" => Some(Self::Trial),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// True when this plan may chat.
    pub fn can_chat(&self) -> bool {
        matches!(self, Self::Intro | Self::Trial | Self::Active)
    }
}

/// Profile row, 1:1 with a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Database row ID.
    pub id: i64,
    /// Owning user (unique).
    pub user_id: i64,
    /// What the user renamed their bestie to, if anything.
    pub bestie_name: Option<String>,
    /// Current plan.
    pub plan_status: PlanStatus,
    /// When the Gumroad trial started.
    pub trial_start_date: Option<DateTime<Utc>>,
    /// Next renewal date.
    pub plan_renews_at: Option<DateTime<Utc>>,
    /// Email from the Gumroad sale, lowercased.
    pub gumroad_email: Option<String>,
    /// Customer id from the Gumroad sale.
    pub gumroad_customer_id: Option<String>,
    /// Day the daily counters belong to; counters reset when it rolls.
    pub daily_counter_date: Option<NaiveDate>,
    /// Messages handled today.
    pub daily_msg_count: i64,
    /// Links sent today.
    pub daily_link_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_status_roundtrip() {
        for p in [
            PlanStatus::Pending,
            PlanStatus::Intro,
            PlanStatus::Trial,
            PlanStatus::Active,
            PlanStatus::Expired,
            PlanStatus::Canceled,
        ] {
            assert_eq!(PlanStatus::from_str(p.as_str()), Some(p));
        }
        assert_eq!(PlanStatus::from_str("vip"), None);
    }

    #[test]
    fn test_can_chat() {
        assert!(PlanStatus::Intro.can_chat());
        assert!(PlanStatus::Trial.can_chat());
        assert!(PlanStatus::Active.can_chat());
        assert!(!PlanStatus::Pending.can_chat());
        assert!(!PlanStatus::Expired.can_chat());
        assert!(!PlanStatus::Canceled.can_chat());
    }
}
