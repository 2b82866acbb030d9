//! HTTP API: webhook intake, Gumroad plan sync, and operational probes.
//!
//! Handlers store rows and enqueue jobs; the reply pipeline itself runs in
//! the queue worker. GoHighLevel redelivers webhooks on non-200 responses,
//! so the intake path answers 200 even when processing fails and records
//! the failure in the error log instead.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::config::{env_nonempty, env_parse, Settings};
use crate::outbound::OutboundSender;
use crate::queue::{TaskQueue, QUEUE_NAME};
use crate::repository::util::redact_url_password;
use crate::repository::DbContext;
use crate::services::ReplyService;

/// Gumroad webhook settings, read from `GUMROAD_SIGNING_SECRET`,
/// `GUMROAD_TRIAL_PRODUCT_ID`, `GUMROAD_FULL_PRODUCT_ID` and
/// `FREE_TRIAL_DAYS`.
#[derive(Debug, Clone)]
pub struct GumroadConfig {
    /// HMAC key for `X-Gumroad-Signature`. Unset skips verification.
    pub signing_secret: Option<String>,
    /// Product permalink that starts a trial.
    pub trial_product_id: String,
    /// Product permalink for the paid plan.
    pub full_product_id: String,
    /// Trial length used when computing the renewal date.
    pub free_trial_days: i64,
}

impl Default for GumroadConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            trial_product_id: "gexqp".to_string(),
            full_product_id: "ibltj".to_string(),
            free_trial_days: 14,
        }
    }
}

impl GumroadConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            signing_secret: env_nonempty("GUMROAD_SIGNING_SECRET"),
            trial_product_id: env_nonempty("GUMROAD_TRIAL_PRODUCT_ID")
                .unwrap_or(defaults.trial_product_id),
            full_product_id: env_nonempty("GUMROAD_FULL_PRODUCT_ID")
                .unwrap_or(defaults.full_product_id),
            free_trial_days: env_parse("FREE_TRIAL_DAYS", defaults.free_trial_days),
        }
    }
}

/// Shared state for the API server.
#[derive(Clone)]
pub struct AppState {
    pub ctx: DbContext,
    pub queue: TaskQueue,
    pub reply: ReplyService,
    pub gumroad: GumroadConfig,
    /// Redis URL, echoed (password redacted) by the queue probe.
    pub redis_url: String,
    /// Shared secret GoHighLevel sends with each webhook. Unset accepts all.
    pub webhook_secret: Option<String>,
    /// Secret protecting the cron and debug endpoints. Unset locks them.
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let ctx = DbContext::from_url(
            &settings.database_url(),
            settings.db_pool_size,
            settings.db_pool_timeout,
        )?;
        // Lazy: the queue connects on first use, so the API can boot and
        // serve intake while Redis is still coming up.
        let queue = TaskQueue::open(&settings.redis_url)?;
        let reply = ReplyService::from_env(ctx.clone(), OutboundSender::from_env());

        Ok(Self {
            ctx,
            queue,
            reply,
            gumroad: GumroadConfig::from_env(),
            redis_url: settings.redis_url.clone(),
            webhook_secret: env_nonempty("WEBHOOK_SECRET"),
            cron_secret: env_nonempty("CRON_SECRET"),
        })
    }
}

/// Start the API server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    tracing::info!(
        redis_url = %redact_url_password(&settings.redis_url),
        queue = QUEUE_NAME,
        "queue configured"
    );
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::linkwrap::LinkwrapConfig;
    use crate::models::{Direction, PlanStatus};
    use crate::monetize::MonetizeConfig;
    use crate::services::{PlanConfig, SmsConfig};

    // Nothing listens on port 1, so enqueue attempts fail fast while the
    // storage side of each handler still runs for real.
    const DEAD_REDIS: &str = "redis://127.0.0.1:1";

    async fn setup_state() -> (AppState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let reply = ReplyService::new(
            ctx.clone(),
            OutboundSender::new(None),
            PlanConfig::default(),
            SmsConfig { part_delay_ms: 0 },
            LinkwrapConfig::default(),
            MonetizeConfig::default(),
        );

        let state = AppState {
            ctx,
            queue: TaskQueue::open(DEAD_REDIS).unwrap(),
            reply,
            gumroad: GumroadConfig::default(),
            redis_url: DEAD_REDIS.to_string(),
            webhook_secret: None,
            cron_secret: None,
        };
        (state, dir)
    }

    async fn setup_test_app() -> (axum::Router, AppState, tempfile::TempDir) {
        let (state, dir) = setup_state().await;
        let app = create_router(state.clone());
        (app, state, dir)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _state, _dir) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_webhook_rejects_wrong_secret() {
        let (mut state, _dir) = setup_state().await;
        state.webhook_secret = Some("hush".to_string());
        let app = create_router(state);

        let response = app
            .oneshot(post_json(
                "/webhook/incoming_message",
                r#"{"phone": "+15551230001", "text": "hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_webhook_accepts_bearer_and_query_secret() {
        let (mut state, _dir) = setup_state().await;
        state.webhook_secret = Some("hush".to_string());
        let app = create_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/incoming_message")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer hush")
            .body(Body::from(
                r#"{"phone": "+15551230002", "text": "hey"}"#.to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = create_router(state);
        let response = app
            .oneshot(post_json(
                "/webhook/incoming_message?secret=hush",
                r#"{"phone": "+15551230002", "text": "again"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_stores_inbound_message() {
        let (app, state, _dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json(
                "/webhook/incoming_message",
                r#"{"phone": "+1 (555) 123-0003", "text": "hey bestie", "message_id": "msg-1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ok"], serde_json::json!(true));

        let user = state
            .ctx
            .users()
            .get_by_phone("+15551230003")
            .await
            .unwrap()
            .unwrap();
        let convo = state
            .ctx
            .conversations()
            .latest_for_user(user.id)
            .await
            .unwrap()
            .unwrap();
        let messages = state
            .ctx
            .messages()
            .list_for_conversation(convo.id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::In);
        assert_eq!(messages[0].text, "hey bestie");
        assert!(messages[0].message_id.starts_with("msg-1-"));
    }

    #[tokio::test]
    async fn test_webhook_reads_custom_data_and_contact_fallbacks() {
        let (app, state, _dir) = setup_test_app().await;

        let body = r#"{
            "customData": {"user_phone": "+15551230004", "text": "from custom"},
            "contact": {"id": "c-9", "phone": "+15559990000"}
        }"#;
        let response = app
            .oneshot(post_json("/webhook/incoming_message", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user = state
            .ctx
            .users()
            .get_by_phone("+15551230004")
            .await
            .unwrap()
            .unwrap();
        let convo = state
            .ctx
            .conversations()
            .latest_for_user(user.id)
            .await
            .unwrap()
            .unwrap();
        let messages = state
            .ctx
            .messages()
            .list_for_conversation(convo.id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "from custom");
        assert!(messages[0].message_id.starts_with("c-9-"));
    }

    #[tokio::test]
    async fn test_webhook_ignores_empty_payload() {
        let (app, state, _dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json(
                "/webhook/incoming_message",
                r#"{"phone": "+15551230005", "text": "   "}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"ok": true}));

        let user = state.ctx.users().get_by_phone("+15551230005").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_webhook_tolerates_invalid_json() {
        let (app, _state, _dir) = setup_test_app().await;

        let response = app
            .oneshot(post_json("/webhook/incoming_message", "not json {"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(true));
        assert_eq!(body["error"], serde_json::json!("invalid json"));
    }

    #[tokio::test]
    async fn test_webhook_media_only_payload_stores_message() {
        let (app, state, _dir) = setup_test_app().await;

        let body = r#"{
            "phone": "+15551230006",
            "message": {"attachments": [{"url": "https://cdn.example.com/pic.jpg"}]}
        }"#;
        let response = app
            .oneshot(post_json("/webhook/incoming_message", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user = state
            .ctx
            .users()
            .get_by_phone("+15551230006")
            .await
            .unwrap()
            .unwrap();
        let convo = state
            .ctx
            .conversations()
            .latest_for_user(user.id)
            .await
            .unwrap()
            .unwrap();
        let messages = state
            .ctx
            .messages()
            .list_for_conversation(convo.id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "");
    }

    #[tokio::test]
    async fn test_gumroad_trial_purchase_updates_profile() {
        let (app, state, _dir) = setup_test_app().await;

        let user = state
            .ctx
            .users()
            .get_or_create_by_phone("+15551230007")
            .await
            .unwrap();
        state.ctx.profiles().ensure_exists(user.id).await.unwrap();
        state
            .ctx
            .profiles()
            .apply_plan_purchase(
                user.id,
                PlanStatus::Pending,
                None,
                chrono::Utc::now(),
                "buyer@example.com",
                None,
            )
            .await
            .unwrap();
        state
            .ctx
            .conversations()
            .get_or_create_latest(user.id)
            .await
            .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/gumroad")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "email=Buyer%40example.com&permalink=gexqp&purchaser_id=cust-1",
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"ok": true}));

        let profile = state.ctx.profiles().get(user.id).await.unwrap().unwrap();
        assert_eq!(profile.plan_status, PlanStatus::Trial);
        assert!(profile.trial_start_date.is_some());
        assert_eq!(profile.gumroad_customer_id.as_deref(), Some("cust-1"));

        // Trial purchases push the quiz link into the latest conversation.
        let convo = state
            .ctx
            .conversations()
            .latest_for_user(user.id)
            .await
            .unwrap()
            .unwrap();
        let messages = state
            .ctx
            .messages()
            .list_for_conversation(convo.id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Out);
        assert!(messages[0].text.contains("quiz"));
    }

    #[tokio::test]
    async fn test_gumroad_unknown_email_is_acknowledged() {
        let (app, _state, _dir) = setup_test_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/gumroad")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=nobody%40example.com&permalink=gexqp"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_debug_env_requires_cron_secret() {
        let (mut state, _dir) = setup_state().await;
        state.cron_secret = Some("ops".to_string());
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/debug/env").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/debug/env?secret=ops")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body.get("WEBHOOK_SECRET").is_some());
    }

    #[tokio::test]
    async fn test_plan_rollover_requires_cron_secret() {
        let (mut state, _dir) = setup_state().await;
        state.cron_secret = Some("ops".to_string());
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks/plan_rollover")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Cron misfires get a 200 so the scheduler does not retry, with the
        // refusal in the body.
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(false));
        assert_eq!(body["error"], serde_json::json!("forbidden"));
    }

    #[tokio::test]
    async fn test_plan_rollover_promotes_expired_trials() {
        let (mut state, _dir) = setup_state().await;
        state.cron_secret = None;
        let app = create_router(state.clone());

        let user = state
            .ctx
            .users()
            .get_or_create_by_phone("+15551230008")
            .await
            .unwrap();
        state.ctx.profiles().ensure_exists(user.id).await.unwrap();
        let started = chrono::Utc::now() - chrono::Duration::days(30);
        state
            .ctx
            .profiles()
            .apply_plan_purchase(
                user.id,
                PlanStatus::Trial,
                Some(started),
                started,
                "old@example.com",
                None,
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks/plan_rollover")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"ok": true}));

        let profile = state.ctx.profiles().get(user.id).await.unwrap().unwrap();
        assert_eq!(profile.plan_status, PlanStatus::Active);
    }

    #[tokio::test]
    async fn test_reengage_locked_without_cron_secret() {
        let (app, _state, _dir) = setup_test_app().await;

        // cron_secret unset: the sweep trigger stays locked.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/jobs/reengage?secret=anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
