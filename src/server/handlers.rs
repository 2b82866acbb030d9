//! HTTP request handlers for the API server.
//!
//! Intake is forgiving on purpose: GoHighLevel workflows put the shared
//! secret under half a dozen names, move fields between the body root and
//! `customData`, and redeliver on anything but a 200. Parse failures and
//! storage failures are logged and ACKed, never bounced.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::models::{Direction, PlanStatus};
use crate::queue::{JobKind, QueueError, QUEUE_NAME};
use crate::repository::util::redact_url_password;

type HmacSha256 = Hmac<Sha256>;

/// Env keys whose values never leave the process.
static SENSITIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(secret|key|token|pwd|password|auth|api)").unwrap());

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://[^\s)\]]+").unwrap());

pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

// -------------------- inbound message webhook -------------------- //

/// Accept the shared secret from any of the places GoHighLevel and curl
/// put it. No configured secret means open intake.
fn webhook_auth_ok(
    secret: Option<&str>,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> bool {
    let Some(secret) = secret.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };

    let header_names = [
        "authorization",
        "x-webhook-secret",
        "x-hook-secret",
        "x-ghl-secret",
        "leadconnector-secret",
    ];
    let from_headers = header_names
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()));
    let from_query = ["secret", "token"]
        .iter()
        .filter_map(|key| params.get(*key).map(String::as_str));

    for candidate in from_headers.chain(from_query) {
        if candidate == secret {
            return true;
        }
        if let Some(rest) = candidate.strip_prefix("Bearer ") {
            if rest == secret {
                return true;
            }
        }
    }
    false
}

/// Non-empty string field, trimmed. Empty strings count as absent so the
/// fallback chains keep moving.
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-empty URL-ish field of an attachment object, kept only when
/// it actually looks like a URL.
fn attachment_url(attachment: &Value) -> Option<String> {
    let raw = ["url", "file_url", "link", "source"].iter().find_map(|k| {
        attachment
            .get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })?;
    raw.starts_with("http").then(|| raw.to_string())
}

fn collect_urls_anywhere(value: &Value, bucket: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for v in map.values() {
                collect_urls_anywhere(v, bucket);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_urls_anywhere(v, bucket);
            }
        }
        Value::String(s) => {
            for m in URL_RE.find_iter(s) {
                let url = m.as_str().trim();
                if url.starts_with("http") {
                    bucket.push(url.to_string());
                }
            }
        }
        _ => {}
    }
}

/// Media URLs from the well-known attachment shapes, falling back to a
/// deep scan of every string in the payload. Deduped preserving order.
fn extract_media_urls(body: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    if let Some(list) = body.get("attachments").and_then(Value::as_array) {
        urls.extend(list.iter().filter_map(attachment_url));
    }
    if let Some(list) = body
        .get("message")
        .and_then(|m| m.get("attachments"))
        .and_then(Value::as_array)
    {
        urls.extend(list.iter().filter_map(attachment_url));
    }

    if urls.is_empty() {
        collect_urls_anywhere(body, &mut urls);
    }

    let mut seen = HashSet::new();
    urls.retain(|u| seen.insert(u.clone()));
    urls
}

/// GoHighLevel inbound-SMS webhook.
///
/// Stores the message and queues the reply job. Everything past the secret
/// check ACKs 200 so the provider stops redelivering; failures land in the
/// error log instead of the response.
pub async fn incoming_message(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    if !webhook_auth_ok(state.webhook_secret.as_deref(), &headers, &params) {
        warn!("webhook rejected: missing or invalid secret");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"ok": false, "error": "forbidden"})),
        )
            .into_response();
    }

    let body: Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook body is not JSON");
            return Json(json!({"ok": true, "error": "invalid json"})).into_response();
        }
    };
    debug!(payload = %body, "webhook payload");

    // Some GHL workflows nest the mapped fields under customData
    let payload = body
        .get("customData")
        .or_else(|| body.get("custom_data"))
        .filter(|v| v.is_object())
        .unwrap_or(&body);

    let base_id = str_field(payload, "message_id")
        .or_else(|| str_field(&body, "message_id"))
        .or_else(|| body.get("contact").and_then(|c| str_field(c, "id")))
        .unwrap_or_else(|| "contact".to_string());
    // Receive-time suffix: redeliveries within the same second collapse
    // onto one row, later ones stay distinct
    let message_id = format!("{}-{}", base_id, Utc::now().timestamp());

    let user_phone = str_field(payload, "user_phone")
        .or_else(|| str_field(&body, "user_phone"))
        .or_else(|| str_field(&body, "phone"))
        .or_else(|| body.get("contact").and_then(|c| str_field(c, "phone")));

    let text = str_field(payload, "text")
        .or_else(|| str_field(&body, "text"))
        .or_else(|| body.get("message").and_then(|m| str_field(m, "body")))
        .or_else(|| body.get("activity").and_then(|a| str_field(a, "body")))
        .or_else(|| body.get("contact").and_then(|c| str_field(c, "last_message")))
        .unwrap_or_default();

    let media_urls = extract_media_urls(&body);

    if text.trim().is_empty() && media_urls.is_empty() {
        warn!(phone = ?user_phone, "webhook carried no text and no media");
        return Json(json!({"ok": true})).into_response();
    }

    info!(
        message_id,
        phone = ?user_phone,
        text_len = text.len(),
        media_count = media_urls.len(),
        "webhook accepted"
    );

    if let Err(e) =
        process_incoming(&state, &message_id, user_phone.as_deref(), &text, media_urls).await
    {
        error!(error = %e, message_id, "incoming message processing failed");
        if let Err(log_err) = state
            .ctx
            .errors()
            .insert("incoming_message", &format!("{e:#}"))
            .await
        {
            warn!(error = %log_err, "could not record webhook failure");
        }
    }

    Json(json!({"ok": true})).into_response()
}

/// Store the inbound message and enqueue its reply job.
async fn process_incoming(
    state: &AppState,
    message_id: &str,
    phone: Option<&str>,
    text: &str,
    media_urls: Vec<String>,
) -> anyhow::Result<()> {
    let phone = phone.ok_or_else(|| anyhow::anyhow!("payload has no phone"))?;

    let user = state.ctx.users().get_or_create_by_phone(phone).await?;
    let convo = state
        .ctx
        .conversations()
        .get_or_create_latest(user.id)
        .await?;
    let stored = state
        .ctx
        .messages()
        .insert(convo.id, Direction::In, message_id, text, Some(&user.phone))
        .await?;
    if !stored {
        debug!(message_id, "duplicate message_id, row not written");
    }
    info!(convo_id = convo.id, user_id = user.id, "stored inbound message");

    let job_id = state
        .queue
        .enqueue(JobKind::GenerateReply {
            convo_id: convo.id,
            user_id: user.id,
            text: text.to_string(),
            user_phone: Some(user.phone.clone()),
            media_urls,
        })
        .await?;
    info!(job_id = %job_id, convo_id = convo.id, "enqueued reply job");
    Ok(())
}

// -------------------- Gumroad webhook -------------------- //

fn verify_gumroad_signature(secret: Option<&str>, headers: &HeaderMap, raw: &[u8]) {
    let Some(secret) = secret else {
        return;
    };
    let Some(signature) = headers
        .get("x-gumroad-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };

    // verify_slice compares in constant time
    let verified = hex::decode(signature).ok().is_some_and(|sig| {
        HmacSha256::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(raw);
                mac.verify_slice(&sig).is_ok()
            })
            .unwrap_or(false)
    });
    if !verified {
        warn!("gumroad signature mismatch");
    }
}

/// Flatten the sale payload to string fields. Gumroad posts form-encoded;
/// JSON is accepted as a fallback for manual testing.
fn parse_gumroad_payload(content_type: Option<&str>, raw: &[u8]) -> HashMap<String, String> {
    let is_json = content_type.is_some_and(|c| c.contains("json"));
    if !is_json {
        let pairs: HashMap<String, String> = url::form_urlencoded::parse(raw)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !pairs.is_empty() {
            return pairs;
        }
    }

    serde_json::from_slice::<HashMap<String, Value>>(raw)
        .map(|map| {
            map.into_iter()
                .map(|(k, v)| {
                    let s = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, s)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Gumroad sale webhook. A bad signature logs a warning but the sale is
/// still processed; unknown emails and unmapped products are ACKed so
/// Gumroad stops resending.
pub async fn gumroad(State(state): State<AppState>, headers: HeaderMap, raw: Bytes) -> Response {
    verify_gumroad_signature(state.gumroad.signing_secret.as_deref(), &headers, &raw);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let payload = parse_gumroad_payload(content_type, &raw);
    info!(fields = payload.len(), "gumroad webhook received");
    debug!(payload = ?payload, "gumroad payload");

    match apply_gumroad_sale(&state, &payload).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            error!(error = %e, "gumroad webhook failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": "internal"})),
            )
                .into_response()
        }
    }
}

async fn apply_gumroad_sale(
    state: &AppState,
    payload: &HashMap<String, String>,
) -> anyhow::Result<Value> {
    let first = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| {
            payload
                .get(*k)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
    };

    let email = first(&["email", "purchaser_email"])
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let product = first(&["permalink", "product_permalink", "product_id"])
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let customer = first(&["customer_id", "purchaser_id"]);
    let now = Utc::now();

    if email.is_empty() {
        return Ok(json!({"ok": true}));
    }
    let Some(profile) = state.ctx.profiles().find_by_gumroad_email(&email).await? else {
        info!(email, "gumroad sale for unknown email");
        return Ok(json!({"ok": true}));
    };

    let (status, trial_start, renews) = if product == state.gumroad.trial_product_id {
        (
            PlanStatus::Trial,
            Some(now),
            now + Duration::days(state.gumroad.free_trial_days),
        )
    } else if product == state.gumroad.full_product_id {
        (PlanStatus::Active, None, now + Duration::days(30))
    } else {
        info!(product, "gumroad product not mapped to a plan");
        return Ok(json!({"ok": true}));
    };

    state
        .ctx
        .profiles()
        .apply_plan_purchase(
            profile.user_id,
            status,
            trial_start,
            renews,
            &email,
            customer.as_deref(),
        )
        .await?;
    info!(
        user_id = profile.user_id,
        status = status.as_str(),
        "plan updated from gumroad sale"
    );

    if status == PlanStatus::Trial {
        send_quiz_link(state, profile.user_id).await?;
    }

    Ok(json!({"ok": true}))
}

/// Push the quiz link into the buyer's latest conversation. Buyers who
/// have never texted get it on their first inbound instead.
async fn send_quiz_link(state: &AppState, user_id: i64) -> anyhow::Result<()> {
    let Some(convo) = state.ctx.conversations().latest_for_user(user_id).await? else {
        debug!(user_id, "no conversation yet, quiz link not sent");
        return Ok(());
    };
    let Some(user) = state.ctx.users().get(user_id).await? else {
        warn!(user_id, "profile without a user row");
        return Ok(());
    };

    let text = format!(
        "You’re in. Take your quiz so I can customize your Bestie — it’s quick and makes me scary accurate:\n{}",
        state.reply.plan().quiz_url
    );
    state
        .reply
        .store_and_send(convo.id, user_id, &user.phone, &text)
        .await
}

// -------------------- cron entry points -------------------- //

/// Promote trials older than the trial window to `active`.
///
/// Refusals answer 200 so a misconfigured scheduler does not retry the
/// job forever.
pub async fn plan_rollover(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(expected) = &state.cron_secret {
        let given = headers.get("x-cron-secret").and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!("plan rollover rejected: bad cron secret");
            return Json(json!({"ok": false, "error": "forbidden"})).into_response();
        }
    }

    let now = Utc::now();
    let cutoff = (now - Duration::days(state.reply.plan().free_trial_days)).to_rfc3339();
    let renews = (now + Duration::days(30)).to_rfc3339();
    match state.ctx.profiles().rollover_trials(&cutoff, &renews).await {
        Ok(count) => {
            if count > 0 {
                info!(count, "trials rolled over to active");
            }
            Json(json!({"ok": true})).into_response()
        }
        Err(e) => {
            error!(error = %e, "plan rollover failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": "internal"})),
            )
                .into_response()
        }
    }
}

/// Queue the re-engagement sweep. Unlike the rollover gate, no configured
/// secret means no access at all.
pub async fn trigger_reengage(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let given = headers
        .get("x-cron-secret")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| params.get("secret").cloned());
    let allowed = matches!(
        (given.as_deref(), state.cron_secret.as_deref()),
        (Some(g), Some(e)) if !g.is_empty() && g == e
    );
    if !allowed {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "forbidden"}))).into_response();
    }

    match state.queue.enqueue(JobKind::Reengage).await {
        Ok(id) => {
            info!(job_id = %id, "re-engagement sweep queued");
            Json(json!({"ok": true})).into_response()
        }
        Err(e) => queue_unavailable(e),
    }
}

// -------------------- operational probes -------------------- //

/// Secret-looking keys are fully masked; long values are truncated so the
/// probe stays skimmable.
fn mask_env_value(key: &str, value: Option<String>) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    if SENSITIVE.is_match(key) {
        return Value::String("***".to_string());
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 80 {
        Value::String(value)
    } else {
        let head: String = chars[..76].iter().collect();
        Value::String(format!("{head}…"))
    }
}

/// Masked snapshot of the env keys that steer replies and monetization.
pub async fn debug_env(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let authorized = matches!(
        (params.get("secret"), &state.cron_secret),
        (Some(given), Some(expected)) if given == expected
    );
    if !authorized {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "forbidden"}))).into_response();
    }

    let keys = [
        "TRIAL_URL",
        "FULL_URL",
        "VIP_URL",
        "QUIZ_URL",
        "AMAZON_ASSOCIATE_TAG",
        "GENIUSLINK_WRAP",
        "GENIUSLINK_DOMAIN",
        "ENFORCE_SIGNUP_BEFORE_CHAT",
        "FREE_TRIAL_DAYS",
        "WEBHOOK_SECRET",
    ];
    let mut snapshot = serde_json::Map::new();
    for key in keys {
        snapshot.insert(key.to_string(), mask_env_value(key, std::env::var(key).ok()));
    }
    Json(Value::Object(snapshot)).into_response()
}

fn queue_unavailable(e: QueueError) -> Response {
    error!(error = %e, "queue unreachable");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"ok": false, "error": "queue unavailable"})),
    )
        .into_response()
}

/// Queue depth and a few pending job IDs.
pub async fn debug_queue(State(state): State<AppState>) -> Response {
    let depth = match state.queue.depth().await {
        Ok(n) => n,
        Err(e) => return queue_unavailable(e),
    };
    let sample = match state.queue.sample_ids(5).await {
        Ok(ids) => ids,
        Err(e) => return queue_unavailable(e),
    };

    Json(json!({
        "redis_url": redact_url_password(&state.redis_url),
        "queue": QUEUE_NAME,
        "queued_count": depth,
        "sample_job_ids": sample,
    }))
    .into_response()
}

/// Round-trip probe: enqueue a ping and let the worker log the pong.
pub async fn enqueue_ping(State(state): State<AppState>) -> Response {
    match state.queue.enqueue(JobKind::Ping).await {
        Ok(id) => Json(json!({
            "enqueued": true,
            "queue": QUEUE_NAME,
            "job_id": id,
        }))
        .into_response(),
        Err(e) => queue_unavailable(e),
    }
}
