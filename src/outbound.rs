//! Outbound SMS delivery through the LeadConnector webhook.
//!
//! Delivery is a single POST of `{phone, message}` JSON to
//! `GHL_OUTBOUND_WEBHOOK_URL`. There is no provider SDK; the webhook does
//! the carrier work.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::env_nonempty;
use crate::sms::strip_assistant_prefix;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("outbound webhook is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("delivery failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    phone: &'a str,
    message: &'a str,
}

/// Sender handle. Cheap to clone; wraps one reqwest client.
#[derive(Clone)]
pub struct OutboundSender {
    client: Client,
    webhook_url: Option<String>,
}

impl OutboundSender {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            webhook_url,
        }
    }

    pub fn from_env() -> Self {
        Self::new(env_nonempty("GHL_OUTBOUND_WEBHOOK_URL"))
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Deliver one SMS part. Status >= 400 is an error result.
    pub async fn send(&self, phone: &str, message: &str) -> Result<(), SendError> {
        let url = self.webhook_url.as_deref().ok_or(SendError::NotConfigured)?;
        let message = strip_assistant_prefix(message.trim());

        info!(phone = %phone, chars = message.len(), "sending SMS part");
        let resp = self
            .client
            .post(url)
            .json(&SmsPayload {
                phone,
                message: &message,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "LeadConnector delivery failed");
            return Err(SendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_sender_errors() {
        let sender = OutboundSender::new(None);
        assert!(!sender.is_configured());
        let err = sender.send("+15551234567", "hi").await.unwrap_err();
        assert!(matches!(err, SendError::NotConfigured));
    }
}
