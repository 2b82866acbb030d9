//! SMS text shaping.
//!
//! Replies are composed as light markdown internally but must go out as
//! plain text. This module flattens markdown links, strips unresolved link
//! placeholders, and splits long replies into numbered parts that fit SMS
//! length limits.

use std::sync::LazyLock;

use regex::Regex;

/// Carrier-safe length for a single SMS part.
pub const MAX_SMS_LEN: usize = 450;

/// Opener prepended to multi-link replies that arrive with no framing text.
pub const FLAT_REPLY_OPENER: &str = "Got you, babe. Here are a couple that actually work:";

static ANGLE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^>\s]+)>").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").unwrap());
static ASSISTANT_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*bestie\s*[:,\-–—]\s*").unwrap());
static LINK_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[(?:link|links)[^\]]*\]").unwrap());
static URL_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bURL\b[: ]?").unwrap());
static AMAZON_SEARCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://(?:www\.)?amazon\.[^/\s]+/s\?[^)\s]+").unwrap());

/// Flatten markdown link syntax into plain text.
///
/// `<https://x>` becomes `https://x` and `[label](https://x)` becomes
/// `label — https://x` so the URL survives in a plain SMS body.
pub fn to_plain_sms(text: &str) -> String {
    let out = ANGLE_URL_RE.replace_all(text, "$1");
    MD_LINK_RE.replace_all(&out, "$1 — $2").into_owned()
}

/// Strip a leading "Bestie:"-style self-prefix the composer sometimes adds.
pub fn strip_assistant_prefix(text: &str) -> String {
    ASSISTANT_PREFIX_RE.replace(text, "").into_owned()
}

/// Remove unresolved `[link]` placeholders and bare "URL:" markers.
///
/// These appear when a draft promises a link the wrapper never filled in.
/// Better to drop the marker than send the user a literal `[link here]`.
pub fn strip_link_placeholders(text: &str) -> String {
    let out = LINK_PLACEHOLDER_RE.replace_all(text, "");
    URL_WORD_RE.replace_all(&out, "").trim().to_string()
}

/// Drop Amazon search-results URLs (`/s?k=...`) from a reply.
///
/// Search links monetize nothing and look like spam; product pages are the
/// only Amazon links worth sending.
pub fn strip_amazon_search_links(text: &str) -> String {
    AMAZON_SEARCH_RE.replace_all(text, "").trim().to_string()
}

/// Prepend a short opener when a reply is just a pile of links.
///
/// Kicks in only for link-dense replies (two or more URLs) that still have
/// room for the opener.
pub fn add_personality_if_flat(text: &str) -> String {
    if text.matches("http").count() >= 2 && text.chars().count() < 480 {
        format!("{FLAT_REPLY_OPENER}\n{text}")
    } else {
        text.to_string()
    }
}

/// Split a long reply into SMS-sized parts, breaking at word boundaries.
///
/// Multi-part replies get `[i/n]` prefixes so out-of-order delivery is
/// readable. Single-part replies are left unmarked.
pub fn split_for_sms(text: &str, max_len: usize) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut rest = text.trim().to_string();

    while rest.chars().count() > max_len {
        let head: String = rest.chars().take(max_len).collect();
        // Byte index of the last space inside the window; head is a prefix
        // of rest so the index is valid in both.
        let split_at = head.rfind(' ').unwrap_or(head.len());
        let (chunk, tail) = rest.split_at(split_at);
        parts.push(chunk.trim().to_string());
        rest = tail.trim().to_string();
    }
    if !rest.is_empty() {
        parts.push(rest);
    }

    if parts.len() > 1 {
        let total = parts.len();
        parts = parts
            .into_iter()
            .enumerate()
            .map(|(i, p)| format!("[{}/{}] {}", i + 1, total, p))
            .collect();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_links_flattened() {
        assert_eq!(
            to_plain_sms("check <https://example.com/x> out"),
            "check https://example.com/x out"
        );
        assert_eq!(
            to_plain_sms("try [this serum](https://example.com/serum)"),
            "try this serum — https://example.com/serum"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(to_plain_sms("no links here"), "no links here");
    }

    #[test]
    fn test_assistant_prefix_stripped() {
        assert_eq!(strip_assistant_prefix("Bestie: hey you"), "hey you");
        assert_eq!(strip_assistant_prefix("  bestie — hey"), "hey");
        assert_eq!(strip_assistant_prefix("bestierest"), "bestierest");
    }

    #[test]
    fn test_link_placeholders_removed() {
        assert_eq!(
            strip_link_placeholders("grab it here [link coming] ok"),
            "grab it here  ok"
        );
        assert_eq!(strip_link_placeholders("the URL: is gone"), "is gone");
    }

    #[test]
    fn test_amazon_search_links_removed() {
        let text = "try https://www.amazon.com/s?k=retinol+cream tonight";
        assert_eq!(strip_amazon_search_links(text), "try  tonight");
        // Product pages survive
        let dp = "https://www.amazon.com/dp/B00ABCDEF1";
        assert_eq!(strip_amazon_search_links(dp), dp);
    }

    #[test]
    fn test_flat_reply_gets_opener() {
        let flat = "https://a.example/1\nhttps://b.example/2";
        let out = add_personality_if_flat(flat);
        assert!(out.starts_with(FLAT_REPLY_OPENER));
        // One link is not flat
        assert_eq!(
            add_personality_if_flat("here https://a.example/1"),
            "here https://a.example/1"
        );
    }

    #[test]
    fn test_short_message_single_part() {
        let parts = split_for_sms("short and sweet", MAX_SMS_LEN);
        assert_eq!(parts, vec!["short and sweet"]);
    }

    #[test]
    fn test_long_message_numbered_parts() {
        let word = "glow ";
        let long: String = word.repeat(200); // 1000 chars
        let parts = split_for_sms(&long, MAX_SMS_LEN);
        assert!(parts.len() > 1);
        assert!(parts[0].starts_with("[1/"));
        assert!(parts.last().unwrap().starts_with(&format!("[{}/", parts.len())));
        // Word boundaries respected: no part ends mid-word
        for part in &parts {
            assert!(!part.ends_with("glo"));
        }
    }

    #[test]
    fn test_unbroken_run_splits_hard() {
        let long = "x".repeat(1000);
        let parts = split_for_sms(&long, MAX_SMS_LEN);
        assert_eq!(parts.len(), 3);
        // "[1/3] " prefix plus the 450-char window
        assert_eq!(parts[0].chars().count(), 6 + 450);
    }

    #[test]
    fn test_empty_message_no_parts() {
        assert!(split_for_sms("   ", MAX_SMS_LEN).is_empty());
    }
}
