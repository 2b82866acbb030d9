//! Re-engagement sweep.
//!
//! Finds conversations where the user went quiet and sends a nudge through
//! the normal outbound path. Quiet means no inbound message for
//! [`QUIET_AFTER_HOURS`]; an outbound message in the last
//! [`NUDGE_COOLDOWN_HOURS`] puts the conversation on cooldown, so sweeps
//! running back to back cannot double-text anyone.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::reply::{pick, ReplyService};
use crate::repository::DbContext;

/// Hours of inbound silence before a conversation counts as quiet.
pub const QUIET_AFTER_HOURS: i64 = 48;

/// Minimum hours between nudges to the same conversation.
pub const NUDGE_COOLDOWN_HOURS: i64 = 24;

const NUDGE_LINES: [&str; 5] = [
    "I was scrolling my mental rolodex and realized you ghosted me. What’s up?",
    "Tell me one thing that lit you up this week. I don’t care how small.",
    "I miss our chaos dumps. What’s one thing that’s been driving you nuts?",
    "Flex time: share one win from this week.",
    "Spill one ridiculous detail from the last 48 hours.",
];

/// Sends nudges to conversations that have gone quiet.
#[derive(Clone)]
pub struct ReengageService {
    ctx: DbContext,
    reply: ReplyService,
}

impl ReengageService {
    pub fn new(ctx: DbContext, reply: ReplyService) -> Self {
        Self { ctx, reply }
    }

    /// Run one sweep. Returns the number of nudges sent.
    pub async fn run(&self) -> anyhow::Result<usize> {
        self.sweep(Utc::now()).await
    }

    async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = (now - Duration::hours(QUIET_AFTER_HOURS)).to_rfc3339();
        let quiet = self.ctx.conversations().find_quiet_since(&cutoff).await?;
        info!(candidates = quiet.len(), "re-engagement sweep start");

        let mut sent = 0usize;
        for convo in quiet {
            if let Some(at) = self.ctx.messages().latest_outbound_at(convo.id).await? {
                if now - at < Duration::hours(NUDGE_COOLDOWN_HOURS) {
                    debug!(convo_id = convo.id, "on nudge cooldown, skipping");
                    continue;
                }
            }
            let Some(user) = self.ctx.users().get(convo.user_id).await? else {
                warn!(
                    convo_id = convo.id,
                    user_id = convo.user_id,
                    "conversation has no user, skipping"
                );
                continue;
            };
            let line = pick(&NUDGE_LINES);
            self.reply
                .store_and_send(convo.id, user.id, &user.phone, line)
                .await?;
            sent += 1;
        }

        info!(sent, "re-engagement sweep complete");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkwrap::LinkwrapConfig;
    use crate::models::Direction;
    use crate::monetize::MonetizeConfig;
    use crate::outbound::OutboundSender;
    use crate::repository::{DbContext, DbError};
    use crate::services::reply::{PlanConfig, SmsConfig};
    use tempfile::tempdir;

    async fn setup() -> (ReengageService, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let user = ctx
            .users()
            .get_or_create_by_phone("+15551230009")
            .await
            .unwrap();
        let convo = ctx
            .conversations()
            .get_or_create_latest(user.id)
            .await
            .unwrap();
        let reply = ReplyService::new(
            ctx.clone(),
            OutboundSender::new(None),
            PlanConfig::default(),
            SmsConfig { part_delay_ms: 0 },
            LinkwrapConfig::default(),
            MonetizeConfig::default(),
        );
        let service = ReengageService::new(ctx, reply);
        (service, dir, convo.id)
    }

    /// Messages insert with `created_at = now`; rewrite it so a test can
    /// simulate elapsed time.
    async fn backdate(ctx: &DbContext, message_id: &str, at: DateTime<Utc>) {
        use crate::schema::messages;
        use diesel::prelude::*;
        use diesel_async::RunQueryDsl;

        let updated: Result<usize, DbError> = async {
            crate::with_conn!(ctx.pool(), conn => {
                diesel::update(
                    messages::table.filter(messages::message_id.eq(message_id.to_string())),
                )
                .set(messages::created_at.eq(at.to_rfc3339()))
                .execute(&mut conn)
                .await
            })
        }
        .await;
        assert_eq!(updated.unwrap(), 1);
    }

    async fn outbound_texts(ctx: &DbContext, convo_id: i64) -> Vec<String> {
        ctx.messages()
            .list_for_conversation(convo_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.direction == Direction::Out)
            .map(|m| m.text)
            .collect()
    }

    #[tokio::test]
    async fn test_sweep_nudges_quiet_conversation() {
        let (service, _dir, convo_id) = setup().await;
        service
            .ctx
            .messages()
            .insert(convo_id, Direction::In, "in-1", "hey", None)
            .await
            .unwrap();
        backdate(&service.ctx, "in-1", Utc::now() - Duration::hours(72)).await;

        let sent = service.sweep(Utc::now()).await.unwrap();
        assert_eq!(sent, 1);

        let texts = outbound_texts(&service.ctx, convo_id).await;
        assert_eq!(texts.len(), 1);
        assert!(NUDGE_LINES.contains(&texts[0].as_str()));
    }

    #[tokio::test]
    async fn test_sweep_respects_cooldown() {
        let (service, _dir, convo_id) = setup().await;
        service
            .ctx
            .messages()
            .insert(convo_id, Direction::In, "in-1", "hey", None)
            .await
            .unwrap();
        backdate(&service.ctx, "in-1", Utc::now() - Duration::hours(72)).await;
        service
            .ctx
            .messages()
            .insert(convo_id, Direction::Out, "out-1", "nudge", None)
            .await
            .unwrap();
        backdate(&service.ctx, "out-1", Utc::now() - Duration::hours(12)).await;

        // Nudged 12h ago: still on cooldown
        assert_eq!(service.sweep(Utc::now()).await.unwrap(), 0);

        // Cooldown expired: nudge again
        backdate(&service.ctx, "out-1", Utc::now() - Duration::hours(30)).await;
        assert_eq!(service.sweep(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_active_and_empty_conversations() {
        let (service, _dir, convo_id) = setup().await;

        // No messages at all: never active, nothing to revive
        assert_eq!(service.sweep(Utc::now()).await.unwrap(), 0);

        // Fresh inbound: user is talking, leave them alone
        service
            .ctx
            .messages()
            .insert(convo_id, Direction::In, "in-1", "hey", None)
            .await
            .unwrap();
        assert_eq!(service.sweep(Utc::now()).await.unwrap(), 0);
        assert!(outbound_texts(&service.ctx, convo_id).await.is_empty());
    }
}
