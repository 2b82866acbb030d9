//! The reply pipeline.
//!
//! A claimed `generate_reply` job runs through ordered stages; the first
//! stage that produces a reply sends it and stops. Stage order is load
//! bearing: the plan gate must run before anything user-visible, safety
//! must preempt product recommendations, and the fallback only fires when
//! nothing else matched.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{build_candidates, prefer_amazon_first};
use crate::config::{env_flag, env_nonempty, env_parse};
use crate::intent::{extract_product_intent, IntentKind, ProductIntent};
use crate::linkwrap::{ensure_not_link_ending, wrap_all_affiliates, wrap_url, LinkwrapConfig};
use crate::models::{Direction, PlanStatus, UserProfile};
use crate::monetize::{self, MonetizeConfig, Offer};
use crate::outbound::OutboundSender;
use crate::phone::same_phone;
use crate::repository::{DbContext, DbError};
use crate::safety::safety_guard;
use crate::sms::{
    add_personality_if_flat, split_for_sms, strip_amazon_search_links, strip_link_placeholders,
    to_plain_sms, MAX_SMS_LEN,
};

/// Default Gumroad product page for trial and full signups.
pub const DEFAULT_STORE_URL: &str = "https://schizobestie.gumroad.com/l/bestie_basic";

/// Default personalization quiz URL.
pub const DEFAULT_QUIZ_URL: &str = "https://tally.so/r/YOUR_QUIZ_ID";

/// Sent when the plan gate itself fails; never blocks on a database error.
pub const GLITCH_LINE: &str = "Babe, I glitched. Give me one sec to reboot my attitude. 💅";

/// First-message welcomes, picked uniformly.
const ONBOARDING_LINES: [&str; 4] = [
    "OMG, you made it. Welcome to chaos, clarity, and couture-level glow ups. Text me anything. 💅",
    "Hi. I’m Bestie. I don’t do small talk. I do savage insight and glow ups. Ask me something.",
    "You’re in. I’m your emotionally fluent digital best friend. Vent or ask. I’m unshockable.",
    "Welcome to your new favorite addiction. I talk back like a glam oracle with receipts. Let’s go.",
];

const IMAGE_ACK: &str =
    "Ok, I see the pic. Tell me what you want from it: hype, honest review, or a dupe hunt. 💅";
const AUDIO_ACK: &str =
    "Got your voice note, babe. Text me the short version and I’ll work my magic.";

const ROUTINE_AUDIT_LINE: &str = "Routine check: order matters. Cleanser, actives, moisturizer, \
     SPF to finish in the morning. Tell me your one big goal (glow, acne, texture) and I’ll \
     tighten the lineup.";

/// Generic nudges when no stage matched.
const FALLBACK_LINES: [&str; 4] = [
    "I’m listening. Give me the messy version and I’ll give you the plan.",
    "Say more. The chaos is where I do my best work.",
    "Spill the details, babe. Vague questions get vague answers; specifics get magic.",
    "Tell me what outcome you want and I’ll get us there.",
];

const IMAGE_EXTS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];
const AUDIO_EXTS: [&str; 4] = [".mp3", ".m4a", ".wav", ".ogg"];

// Matched against lowercased text, so the patterns stay lowercase.
static RENAME_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\bname\s+you\s+are\s+['"]?([a-z0-9\- _]{2,32})['"]?"#,
        r#"\bi'?ll\s+call\s+you\s+['"]?([a-z0-9\- _]{2,32})['"]?"#,
        r#"\byour\s+name\s+is\s+['"]?([a-z0-9\- _]{2,32})['"]?"#,
        r#"\bfrom\s+now\s+on\s+you\s+are\s+['"]?([a-z0-9\- _]{2,32})['"]?"#,
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Plan gating and storefront URLs, read from `ENFORCE_SIGNUP_BEFORE_CHAT`,
/// `FREE_TRIAL_DAYS`, `DEV_BYPASS_PHONE`, `TRIAL_URL`, `FULL_URL` and
/// `QUIZ_URL`.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// Block `pending` users at the gate when set.
    pub enforce_signup: bool,
    pub free_trial_days: i64,
    /// Phone that always passes the gate, for end-to-end testing.
    pub dev_bypass_phone: Option<String>,
    pub trial_url: String,
    pub full_url: String,
    pub quiz_url: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            enforce_signup: false,
            free_trial_days: 7,
            dev_bypass_phone: None,
            trial_url: DEFAULT_STORE_URL.to_string(),
            full_url: DEFAULT_STORE_URL.to_string(),
            quiz_url: DEFAULT_QUIZ_URL.to_string(),
        }
    }
}

impl PlanConfig {
    pub fn from_env() -> Self {
        Self {
            enforce_signup: env_flag("ENFORCE_SIGNUP_BEFORE_CHAT"),
            free_trial_days: env_parse("FREE_TRIAL_DAYS", 7),
            dev_bypass_phone: env_nonempty("DEV_BYPASS_PHONE"),
            trial_url: env_nonempty("TRIAL_URL").unwrap_or_else(|| DEFAULT_STORE_URL.to_string()),
            full_url: env_nonempty("FULL_URL").unwrap_or_else(|| DEFAULT_STORE_URL.to_string()),
            quiz_url: env_nonempty("QUIZ_URL").unwrap_or_else(|| DEFAULT_QUIZ_URL.to_string()),
        }
    }
}

/// Outbound SMS pacing.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// Pause between multipart sends so carriers keep ordering.
    pub part_delay_ms: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self { part_delay_ms: 800 }
    }
}

impl SmsConfig {
    pub fn from_env() -> Self {
        Self {
            part_delay_ms: env_parse("SMS_PART_DELAY_MS", 800),
        }
    }
}

/// Outcome of the plan gate.
enum Gate {
    Allowed,
    Blocked(String),
}

/// Runs the reply pipeline and owns the outbound path.
///
/// Cheap to clone; every worker task gets its own copy.
#[derive(Clone)]
pub struct ReplyService {
    ctx: DbContext,
    sender: OutboundSender,
    plan: PlanConfig,
    sms: SmsConfig,
    wrap: LinkwrapConfig,
    monetize: MonetizeConfig,
}

impl ReplyService {
    pub fn new(
        ctx: DbContext,
        sender: OutboundSender,
        plan: PlanConfig,
        sms: SmsConfig,
        wrap: LinkwrapConfig,
        monetize: MonetizeConfig,
    ) -> Self {
        Self {
            ctx,
            sender,
            plan,
            sms,
            wrap,
            monetize,
        }
    }

    /// Build a service with every sub-config read from the environment.
    pub fn from_env(ctx: DbContext, sender: OutboundSender) -> Self {
        Self::new(
            ctx,
            sender,
            PlanConfig::from_env(),
            SmsConfig::from_env(),
            LinkwrapConfig::from_env(),
            MonetizeConfig::from_env(),
        )
    }

    pub fn plan(&self) -> &PlanConfig {
        &self.plan
    }

    /// Run the full pipeline for one inbound message.
    pub async fn generate_reply(
        &self,
        convo_id: i64,
        user_id: i64,
        text: &str,
        user_phone: Option<&str>,
        media_urls: &[String],
    ) -> anyhow::Result<()> {
        let normalized = text.trim().to_lowercase();
        info!(convo_id, user_id, text_len = text.len(), media = media_urls.len(), "reply job start");

        let phone = match user_phone {
            Some(p) => p.to_string(),
            None => self
                .ctx
                .users()
                .get(user_id)
                .await?
                .map(|u| u.phone)
                .ok_or_else(|| anyhow::anyhow!("user {user_id} not found for outbound send"))?,
        };

        // 0) Plan gate. A gate error must never silently drop the message.
        match self.plan_gate(user_id, Some(&phone)).await {
            Ok(Gate::Allowed) => {}
            Ok(Gate::Blocked(wall)) => {
                info!(user_id, "blocked at plan gate");
                self.store_and_send(convo_id, user_id, &phone, &wall).await?;
                return Ok(());
            }
            Err(e) => {
                warn!(user_id, error = %e, "plan gate failed, sending glitch line");
                self.store_and_send(convo_id, user_id, &phone, GLITCH_LINE)
                    .await?;
                return Ok(());
            }
        }

        // 1) Onboarding: only the stored inbound message itself exists yet.
        if self.ctx.messages().count_for_conversation(convo_id).await? <= 1 {
            let line = pick(&ONBOARDING_LINES);
            self.store_and_send(convo_id, user_id, &phone, line).await?;
            return Ok(());
        }

        // 2) Media acknowledgment
        if let Some(ack) = media_ack(media_urls, &normalized) {
            self.store_and_send(convo_id, user_id, &phone, ack).await?;
            return Ok(());
        }

        // 3) FAQ
        if let Some(canned) = self.faq_reply(&normalized) {
            self.store_and_send(convo_id, user_id, &phone, &canned)
                .await?;
            return Ok(());
        }

        // 4) Rename
        if let Some(confirm) = self.try_rename(user_id, &normalized).await? {
            self.store_and_send(convo_id, user_id, &phone, &confirm)
                .await?;
            return Ok(());
        }

        // 5) Safety scan preempts everything below it.
        if let Some(reply) = safety_guard(text, "US", None) {
            info!(user_id, "safety guard fired");
            self.store_and_send(convo_id, user_id, &phone, &reply)
                .await?;
            return Ok(());
        }

        // 6) Product intent
        if let Some(intent) = extract_product_intent(text) {
            if intent.intent == IntentKind::RoutineAudit {
                self.store_and_send(convo_id, user_id, &phone, ROUTINE_AUDIT_LINE)
                    .await?;
                return Ok(());
            }
            if let Some(reply) = self.product_reply(convo_id, user_id, &intent).await? {
                self.store_and_send(convo_id, user_id, &phone, &reply)
                    .await?;
                return Ok(());
            }
        }

        // 7) Fallback
        let line = pick(&FALLBACK_LINES);
        self.store_and_send(convo_id, user_id, &phone, line).await?;
        Ok(())
    }

    /// Normalize profile defaults and decide whether this user may chat.
    ///
    /// `pending` blocks only when signup enforcement is on; a trial older
    /// than the free window blocks as expired. The gate reads plan state
    /// but never mutates it.
    async fn plan_gate(&self, user_id: i64, user_phone: Option<&str>) -> Result<Gate, DbError> {
        let profiles = self.ctx.profiles();
        profiles.ensure_exists(user_id).await?;
        let profile = profiles
            .get(user_id)
            .await?
            .ok_or(diesel::result::Error::NotFound)?;

        let today = Utc::now().date_naive();
        if profile.daily_counter_date != Some(today) {
            profiles.reset_daily_counters(user_id, today).await?;
        }

        if let (Some(phone), Some(bypass)) = (user_phone, self.plan.dev_bypass_phone.as_deref()) {
            if same_phone(phone, bypass) {
                debug!(user_id, "dev bypass phone, gate passed");
                return Ok(Gate::Allowed);
            }
        }

        let gate = match profile.plan_status {
            PlanStatus::Intro | PlanStatus::Active => Gate::Allowed,
            PlanStatus::Trial => match profile.trial_start_date {
                None => Gate::Blocked(self.wall_start_message(&profile)),
                Some(start) => {
                    let days_in = (Utc::now() - start).num_days();
                    if days_in >= self.plan.free_trial_days {
                        Gate::Blocked(self.wall_trial_expired_message())
                    } else {
                        Gate::Allowed
                    }
                }
            },
            PlanStatus::Pending => {
                if self.plan.enforce_signup {
                    Gate::Blocked(self.wall_start_message(&profile))
                } else {
                    Gate::Allowed
                }
            }
            PlanStatus::Expired => Gate::Blocked(self.wall_trial_expired_message()),
            PlanStatus::Canceled => Gate::Blocked(self.wall_start_message(&profile)),
        };
        Ok(gate)
    }

    /// Paywall for users who never paid: trial pitch if they never started
    /// one, otherwise the full-price link.
    fn wall_start_message(&self, profile: &UserProfile) -> String {
        if profile.trial_start_date.is_none() {
            format!(
                "Before we chat, start your access so I remember everything and tailor recs.\n\
                 {}\n\
                 1 week free, then $17/mo. Cancel anytime. No refunds.",
                self.plan.trial_url
            )
        } else {
            format!(
                "Your trial ended. To keep going it’s $17/mo. Cancel anytime. No refunds.\n{}",
                self.plan.full_url
            )
        }
    }

    fn wall_trial_expired_message(&self) -> String {
        format!(
            "Your free week ended. Upgrade to keep the customized magic. $17/mo. Cancel anytime. No refunds.\n{}",
            self.plan.full_url
        )
    }

    /// Canned answers for the questions every new user asks. Substring
    /// match on the lowercased text; first hit wins.
    fn faq_reply(&self, normalized: &str) -> Option<String> {
        let quiz = &self.plan.quiz_url;
        if normalized.contains("how do i take the quiz") {
            return Some(format!(
                "Take the quiz here, babe. It unlocks your personalized Bestie: {quiz}"
            ));
        }
        if normalized.contains("where do i take the quiz") {
            return Some(format!("Here’s your link: {quiz}"));
        }
        if normalized.contains("quiz link") {
            return Some(format!("Quiz link incoming: {quiz}"));
        }
        if normalized.contains("how much is vip") {
            return Some(
                "1 week free, then $17/month. Upgrades unlock by invitation (Plus $27, Elite $37). Cancel anytime."
                    .to_string(),
            );
        }
        if normalized.contains("vip cost") {
            return Some(
                "1 week free, then $17/month. Upgrades are invite-only when you hit caps."
                    .to_string(),
            );
        }
        if normalized.contains("price of vip") {
            return Some(
                "Start at $17/month after a 1-week free trial. Upgrades unlock by invitation."
                    .to_string(),
            );
        }
        if normalized.contains("how much are prompt packs") {
            return Some("Prompt Packs are $7 each or 3 for $20.".to_string());
        }
        if normalized.contains("prompt pack price") {
            return Some(
                "Each pack is $7 — or 3 for $20. Link: https://schizobestie.gumroad.com/"
                    .to_string(),
            );
        }
        if normalized.contains("prompt packs link") {
            return Some("Right this way: https://schizobestie.gumroad.com/".to_string());
        }
        None
    }

    /// "call you X" / "your name is X" updates `bestie_name` and confirms.
    async fn try_rename(&self, user_id: i64, normalized: &str) -> Result<Option<String>, DbError> {
        for re in RENAME_RES.iter() {
            if let Some(caps) = re.captures(normalized) {
                let name = caps[1].trim().to_string();
                self.ctx.profiles().set_bestie_name(user_id, &name).await?;
                info!(user_id, name = %name, "bestie renamed");
                return Ok(Some(rename_confirmation(&name)));
            }
        }
        Ok(None)
    }

    /// Catalog search, monetized ranking, and a numbered reply.
    ///
    /// Links are wrapped per offer at compose time, then the reply goes
    /// through the hygiene passes; whatever search links the wrapper could
    /// not monetize get stripped. A `links` row is recorded for every URL
    /// that survives into the final text.
    async fn product_reply(
        &self,
        convo_id: i64,
        user_id: i64,
        intent: &ProductIntent,
    ) -> anyhow::Result<Option<String>> {
        let candidates = prefer_amazon_first(build_candidates(intent));
        if candidates.is_empty() {
            return Ok(None);
        }

        let offers: Vec<Offer> = candidates
            .iter()
            .map(|c| Offer {
                title: c.title.clone(),
                url: c.url.clone(),
                ..Offer::default()
            })
            .collect();

        let count = intent.count().unwrap_or(3).clamp(1, 3);
        let ranked = monetize::top_k(
            &offers,
            &intent.include_brands(),
            count,
            &self.monetize,
            &self.wrap,
        );
        if ranked.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(ranked.len());
        let mut sent_urls = Vec::with_capacity(ranked.len());
        for (i, scored) in ranked.iter().enumerate() {
            let url = wrap_url(&scored.offer.url, &self.wrap);
            let reason = candidates
                .iter()
                .find(|c| c.title == scored.offer.title)
                .and_then(|c| c.reason.as_deref());
            let line = match reason {
                Some(r) => format!("{}. **{}**: {} {}", i + 1, scored.offer.title, r, url),
                None => format!("{}. **{}**: {}", i + 1, scored.offer.title, url),
            };
            lines.push(line);
            sent_urls.push((scored, url));
        }
        let reply = lines.join("\n");

        let reply = strip_link_placeholders(&reply);
        let reply = strip_amazon_search_links(&reply);
        let reply = add_personality_if_flat(&reply);
        let reply = wrap_all_affiliates(&reply, &self.wrap);

        let campaign = intent.category.unwrap_or("default");
        let mut recorded = 0i64;
        for (scored, url) in &sent_urls {
            if reply.contains(url.as_str()) {
                self.ctx
                    .links()
                    .insert(
                        convo_id,
                        &scored.offer.url,
                        url,
                        Some(campaign),
                        scored.offer.commission_pct,
                        scored.offer.sponsor_bid_cents,
                    )
                    .await?;
                recorded += 1;
            }
        }
        if recorded > 0 {
            self.ctx
                .profiles()
                .bump_daily_counters(user_id, 0, recorded)
                .await?;
        }
        debug!(convo_id, picks = ranked.len(), recorded, "product reply composed");

        Ok(Some(reply))
    }

    /// Store and send one reply, split into SMS-sized parts.
    ///
    /// Each part gets its own message row and its own POST so carriers
    /// keep ordering; parts after the first wait `part_delay_ms`. A failed
    /// store still attempts the send.
    pub async fn store_and_send(
        &self,
        convo_id: i64,
        user_id: i64,
        phone: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let shaped = ensure_not_link_ending(&to_plain_sms(text), &self.wrap);
        let parts = split_for_sms(&shaped, MAX_SMS_LEN);
        let total = parts.len();

        for (idx, part) in parts.iter().enumerate() {
            let message_id = Uuid::new_v4().to_string();
            if let Err(e) = self
                .ctx
                .messages()
                .insert(convo_id, Direction::Out, &message_id, part, Some(phone))
                .await
            {
                warn!(convo_id, error = %e, "failed to store outbound part, still sending");
            }

            if self.sender.is_configured() {
                if let Err(e) = self.sender.send(phone, part).await {
                    warn!(convo_id, error = %e, "outbound send failed");
                }
            } else {
                debug!(convo_id, "outbound webhook not configured, reply stored only");
            }

            if idx + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.sms.part_delay_ms)).await;
            }
        }

        self.ctx
            .profiles()
            .bump_daily_counters(user_id, 1, 0)
            .await?;
        Ok(())
    }

    /// Wrap one URL and record its `links` row. Used by the wrap_link job.
    pub async fn wrap_and_record(
        &self,
        convo_id: i64,
        raw_url: &str,
        campaign: &str,
    ) -> anyhow::Result<String> {
        let wrapped = wrap_url(raw_url, &self.wrap);
        self.ctx
            .links()
            .insert(convo_id, raw_url, &wrapped, Some(campaign), 0.0, 0)
            .await?;
        Ok(wrapped)
    }
}

pub(super) fn pick<'a>(lines: &'a [&'a str]) -> &'a str {
    lines[rand::rng().random_range(0..lines.len())]
}

fn rename_confirmation(name: &str) -> String {
    match rand::rng().random_range(0..5) {
        0 => format!("So it’s official — {name} has entered the chat. Act accordingly 💅"),
        1 => format!("Fine, but don’t expect me to answer to anything less iconic than {name}."),
        2 => format!("Rename accepted. Consider me reborn as {name} — more savage than ever."),
        3 => format!("Alright, {name}. Let’s see if you can handle me now 😏"),
        _ => format!("{name}? Bold choice. Let’s make it fashion."),
    }
}

/// Route an attachment (or a media URL pasted as text) to its ack line.
///
/// Audio extensions get the voice-note ack; images and extensionless
/// attachments get the picture ack. Text-only detection requires an http
/// URL in the message.
fn media_ack(media_urls: &[String], normalized_text: &str) -> Option<&'static str> {
    if let Some(first) = media_urls.first() {
        let lower = first.trim().to_lowercase();
        if AUDIO_EXTS.iter().any(|ext| lower.ends_with(ext)) {
            return Some(AUDIO_ACK);
        }
        return Some(IMAGE_ACK);
    }
    if normalized_text.contains("http") {
        if IMAGE_EXTS.iter().any(|ext| normalized_text.contains(ext)) {
            return Some(IMAGE_ACK);
        }
        if AUDIO_EXTS.iter().any(|ext| normalized_text.contains(ext)) {
            return Some(AUDIO_ACK);
        }
    }
    None
}
