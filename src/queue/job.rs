//! Queue job payloads.

use serde::{Deserialize, Serialize};

/// What a queued job does. The payload is stored as JSON in the per-job
/// hash, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Run the reply pipeline for one inbound message.
    GenerateReply {
        convo_id: i64,
        user_id: i64,
        text: String,
        user_phone: Option<String>,
        #[serde(default)]
        media_urls: Vec<String>,
    },
    /// Wrap one URL and record the link row.
    WrapLink {
        convo_id: i64,
        raw_url: String,
        campaign: String,
    },
    /// Liveness probe.
    Ping,
    /// Nudge conversations that went quiet.
    Reengage,
}

impl JobKind {
    /// Short name used as the error-log source and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateReply { .. } => "generate_reply",
            Self::WrapLink { .. } => "wrap_link",
            Self::Ping => "ping",
            Self::Reengage => "reengage",
        }
    }

    /// Execution budget. The worker aborts the job past this.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            Self::GenerateReply { .. } => 120,
            Self::WrapLink { .. } => 60,
            Self::Ping => 30,
            Self::Reengage => 120,
        }
    }
}

/// A claimed job: ID plus its decoded payload.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        let kind = JobKind::GenerateReply {
            convo_id: 7,
            user_id: 3,
            text: "hi bestie".into(),
            user_phone: Some("+15551234567".into()),
            media_urls: vec!["https://example.com/pic.jpg".into()],
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"kind\":\"generate_reply\""));
        let back: JobKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn test_media_urls_default() {
        let json = r#"{"kind":"generate_reply","convo_id":1,"user_id":2,"text":"hey","user_phone":null}"#;
        let kind: JobKind = serde_json::from_str(json).unwrap();
        match kind {
            JobKind::GenerateReply { media_urls, .. } => assert!(media_urls.is_empty()),
            other => panic!("wrong kind: {:?}", other),
        }
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(JobKind::Ping.timeout_secs(), 30);
        assert_eq!(JobKind::Reengage.timeout_secs(), 120);
        let wrap = JobKind::WrapLink {
            convo_id: 1,
            raw_url: "https://example.com".into(),
            campaign: "default".into(),
        };
        assert_eq!(wrap.timeout_secs(), 60);
        assert_eq!(wrap.name(), "wrap_link");
    }
}
