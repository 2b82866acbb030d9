//! Affiliate link wrapping.
//!
//! Every outbound URL passes through here before it reaches a phone.
//! Amazon product links are canonicalized to `/dp/ASIN` and routed through
//! Geniuslink (template or domain) or tagged with an associate tag; other
//! retail links go through a ShopMy-style wrapper when one is configured.
//! Navigation links (Google, YouTube) and denylisted hosts pass through
//! untouched.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::{env_flag, env_nonempty};

/// Default ShopMy wrap template. `{pub}` is the publisher id, `{url}` the
/// encoded target.
pub const DEFAULT_SYL_TEMPLATE: &str = "https://go.shopmy.us/p-{pub}?url={url}";
/// Hosts never wrapped, as comma-separated substrings of the full URL.
pub const DEFAULT_SYL_DENYLIST: &str = "geni.us,gumroad.com,bit.ly,tinyurl.com";
/// Closer line appended when a reply would otherwise end on a bare link.
pub const STATIC_CLOSER: &str = "Want the direct page or a cheaper alt?";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://[^\s)>\]]+").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").unwrap());
static URL_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://[^\s)]+)\s*$").unwrap());
static AMAZON_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|\.)amazon\.[^/]+$").unwrap());
static DP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)/dp/([A-Z0-9]{10})").unwrap());
static GP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/gp/product/([A-Z0-9]{10})").unwrap());
// Case-sensitive on purpose: a standalone path segment only counts as an
// ASIN when it is already uppercase.
static BARE_ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([A-Z0-9]{10})(?:[/?]|$)").unwrap());

/// How to finish a reply that ends on a bare URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloserMode {
    /// Append [`STATIC_CLOSER`].
    Static,
    /// Leave the reply as composed.
    #[default]
    Off,
}

impl CloserMode {
    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("static") {
            CloserMode::Static
        } else {
            CloserMode::Off
        }
    }
}

/// Wrapping behavior, read once from the environment.
#[derive(Debug, Clone)]
pub struct LinkwrapConfig {
    pub syl_enabled: bool,
    pub syl_publisher_id: Option<String>,
    pub syl_wrap_template: String,
    /// Allowed retailer host suffixes; `*` means every non-Amazon retailer.
    pub syl_retailers: Vec<String>,
    /// URL substrings that disable wrapping entirely.
    pub syl_denylist: Vec<String>,
    /// Geniuslink template with `{url}`; takes precedence over the domain.
    pub geniuslink_wrap: Option<String>,
    /// Bare Geniuslink domain, used as `https://{domain}/{ASIN}`.
    pub geniuslink_domain: Option<String>,
    pub amazon_associate_tag: Option<String>,
    pub closer_mode: CloserMode,
}

impl Default for LinkwrapConfig {
    fn default() -> Self {
        Self {
            syl_enabled: false,
            syl_publisher_id: None,
            syl_wrap_template: DEFAULT_SYL_TEMPLATE.to_string(),
            syl_retailers: vec!["*".to_string()],
            syl_denylist: split_csv(DEFAULT_SYL_DENYLIST),
            geniuslink_wrap: None,
            geniuslink_domain: None,
            amazon_associate_tag: None,
            closer_mode: CloserMode::Off,
        }
    }
}

impl LinkwrapConfig {
    /// Read wrapping configuration from `SYL_*`, `GENIUSLINK_*`,
    /// `AMAZON_ASSOCIATE_TAG` and `CLOSER_MODE`.
    pub fn from_env() -> Self {
        Self {
            syl_enabled: env_flag("SYL_ENABLED"),
            syl_publisher_id: env_nonempty("SYL_PUBLISHER_ID"),
            syl_wrap_template: env_nonempty("SYL_WRAP_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_SYL_TEMPLATE.to_string()),
            syl_retailers: split_csv(&env_nonempty("SYL_RETAILERS").unwrap_or_else(|| "*".into())),
            syl_denylist: split_csv(
                &env_nonempty("SYL_DENYLIST").unwrap_or_else(|| DEFAULT_SYL_DENYLIST.into()),
            ),
            geniuslink_wrap: env_nonempty("GENIUSLINK_WRAP"),
            geniuslink_domain: env_nonempty("GENIUSLINK_DOMAIN"),
            amazon_associate_tag: env_nonempty("AMAZON_ASSOCIATE_TAG"),
            closer_mode: env_nonempty("CLOSER_MODE")
                .map(|s| CloserMode::from_str(&s))
                .unwrap_or_default(),
        }
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

fn is_amazon_host(host: &str) -> bool {
    AMAZON_HOST_RE.is_match(host)
}

/// Extract an ASIN and rebuild the URL as a bare `/dp/ASIN` product page.
///
/// Tracking refs and search params are dropped along with the rest of the
/// path. Returns `None` when no ASIN can be found.
pub fn amazon_canonical_dp(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();
    let asin = DP_RE
        .captures(path)
        .or_else(|| GP_RE.captures(path))
        .or_else(|| BARE_ASIN_RE.captures(path))
        .map(|c| c[1].to_uppercase())?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}/dp/{}", parsed.scheme(), host, asin))
}

/// Append the associate tag unless the URL already carries one.
pub fn with_associate_tag(url: &str, tag: Option<&str>) -> String {
    let Some(tag) = tag else {
        return url.to_string();
    };
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.query_pairs().any(|(k, _)| k == "tag") {
                return url.to_string();
            }
            parsed.query_pairs_mut().append_pair("tag", tag);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn wrap_amazon(url: &str, cfg: &LinkwrapConfig) -> String {
    let dp = amazon_canonical_dp(url).unwrap_or_else(|| url.to_string());
    if let Some(template) = &cfg.geniuslink_wrap {
        return template.replace("{url}", &urlencoding::encode(&dp));
    }
    if let Some(domain) = &cfg.geniuslink_domain {
        if let Some(caps) = Url::parse(&dp).ok().and_then(|u| {
            DP_RE
                .captures(u.path())
                .map(|c| c[1].to_uppercase())
        }) {
            return format!("https://{}/{}", domain.trim_end_matches('/'), caps);
        }
    }
    with_associate_tag(&dp, cfg.amazon_associate_tag.as_deref())
}

fn syl_eligible(host: &str, cfg: &LinkwrapConfig) -> bool {
    if !cfg.syl_enabled || cfg.syl_publisher_id.is_none() {
        return false;
    }
    if is_amazon_host(host) {
        return false;
    }
    cfg.syl_retailers
        .iter()
        .any(|r| r == "*" || host.ends_with(r.as_str()))
}

fn wrap_syl(url: &str, cfg: &LinkwrapConfig) -> String {
    if let Some(host) = host_of(url) {
        // Already wrapped
        if host.contains("go.shopmy.us")
            || host.contains("goto.shopyourlikes.com")
            || host.contains("go.sylikes.com")
        {
            return url.to_string();
        }
    }
    let Some(publisher) = &cfg.syl_publisher_id else {
        return url.to_string();
    };
    cfg.syl_wrap_template
        .replace("{pub}", publisher)
        .replace("{url}", &urlencoding::encode(url))
}

/// Wrap a single URL according to configuration.
///
/// Denylisted URLs and navigation hosts come back unchanged; Amazon goes
/// through [`wrap_amazon`]-style routing; eligible retailers get the
/// ShopMy template.
pub fn wrap_url(url: &str, cfg: &LinkwrapConfig) -> String {
    let lowered = url.to_lowercase();
    if cfg.syl_denylist.iter().any(|d| lowered.contains(d.as_str())) {
        return url.to_string();
    }
    let Some(host) = host_of(url) else {
        return url.to_string();
    };
    if host.contains("google.") || host.contains("youtu") {
        return url.to_string();
    }
    if is_amazon_host(&host) {
        return wrap_amazon(url, cfg);
    }
    if syl_eligible(&host, cfg) {
        return wrap_syl(url, cfg);
    }
    url.to_string()
}

/// Wrap every URL in a reply, markdown targets first.
///
/// Plain URLs that are already the target of a markdown link are skipped so
/// a wrapped target is not wrapped twice.
pub fn wrap_all_affiliates(text: &str, cfg: &LinkwrapConfig) -> String {
    let mut out = text.to_string();
    for caps in MD_LINK_RE.captures_iter(text) {
        let target = &caps[2];
        let wrapped = wrap_url(target, cfg);
        if wrapped != target {
            out = out.replace(&format!("]({target})"), &format!("]({wrapped})"));
        }
    }
    let snapshot = out.clone();
    URL_RE
        .replace_all(&snapshot, |caps: &regex::Captures| {
            let u = &caps[0];
            if snapshot.contains(&format!("]({u})")) {
                u.to_string()
            } else {
                wrap_url(u, cfg)
            }
        })
        .into_owned()
}

/// Append the static closer when a reply ends on a bare URL.
///
/// No-op unless `CLOSER_MODE=static`.
pub fn ensure_not_link_ending(text: &str, cfg: &LinkwrapConfig) -> String {
    if cfg.closer_mode != CloserMode::Static {
        return text.to_string();
    }
    if URL_END_RE.is_match(text) {
        return format!("{}\n{}", text.trim_end(), STATIC_CLOSER);
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_cfg() -> LinkwrapConfig {
        LinkwrapConfig {
            amazon_associate_tag: Some("bestie-20".to_string()),
            ..LinkwrapConfig::default()
        }
    }

    #[test]
    fn test_amazon_dp_canonicalized() {
        let url = "https://www.amazon.com/Some-Product-Name/dp/B08XYZ1234/ref=sr_1_1?keywords=serum";
        assert_eq!(
            amazon_canonical_dp(url).as_deref(),
            Some("https://www.amazon.com/dp/B08XYZ1234")
        );
    }

    #[test]
    fn test_amazon_gp_product_path() {
        let url = "https://amazon.co.uk/gp/product/b00abcde12?psc=1";
        assert_eq!(
            amazon_canonical_dp(url).as_deref(),
            Some("https://amazon.co.uk/dp/B00ABCDE12")
        );
    }

    #[test]
    fn test_bare_asin_requires_uppercase() {
        assert_eq!(
            amazon_canonical_dp("https://www.amazon.com/B08XYZ1234").as_deref(),
            Some("https://www.amazon.com/dp/B08XYZ1234")
        );
        assert_eq!(amazon_canonical_dp("https://www.amazon.com/b08xyz1234"), None);
    }

    #[test]
    fn test_associate_tag_appended_once() {
        let wrapped = wrap_url("https://www.amazon.com/dp/B08XYZ1234", &tag_cfg());
        assert_eq!(wrapped, "https://www.amazon.com/dp/B08XYZ1234?tag=bestie-20");
        // Existing tag wins
        let tagged = "https://www.amazon.com/dp/B08XYZ1234?tag=other-21";
        assert_eq!(wrap_url(tagged, &tag_cfg()), tagged);
    }

    #[test]
    fn test_geniuslink_template_takes_precedence() {
        let cfg = LinkwrapConfig {
            geniuslink_wrap: Some("https://geni.us/redirect?url={url}".to_string()),
            geniuslink_domain: Some("buy.geni.us".to_string()),
            amazon_associate_tag: Some("bestie-20".to_string()),
            ..LinkwrapConfig::default()
        };
        let wrapped = wrap_url("https://www.amazon.com/dp/B08XYZ1234", &cfg);
        assert_eq!(
            wrapped,
            "https://geni.us/redirect?url=https%3A%2F%2Fwww.amazon.com%2Fdp%2FB08XYZ1234"
        );
    }

    #[test]
    fn test_geniuslink_domain_short_form() {
        let cfg = LinkwrapConfig {
            geniuslink_domain: Some("buy.geni.us/".to_string()),
            ..LinkwrapConfig::default()
        };
        assert_eq!(
            wrap_url("https://www.amazon.com/dp/B08XYZ1234", &cfg),
            "https://buy.geni.us/B08XYZ1234"
        );
    }

    #[test]
    fn test_syl_wrap_for_retailers() {
        let cfg = LinkwrapConfig {
            syl_enabled: true,
            syl_publisher_id: Some("12345".to_string()),
            ..LinkwrapConfig::default()
        };
        let wrapped = wrap_url("https://www.sephora.com/product/glow-serum", &cfg);
        assert_eq!(
            wrapped,
            "https://go.shopmy.us/p-12345?url=https%3A%2F%2Fwww.sephora.com%2Fproduct%2Fglow-serum"
        );
    }

    #[test]
    fn test_syl_respects_retailer_list() {
        let cfg = LinkwrapConfig {
            syl_enabled: true,
            syl_publisher_id: Some("12345".to_string()),
            syl_retailers: vec!["sephora.com".to_string()],
            ..LinkwrapConfig::default()
        };
        assert!(wrap_url("https://www.sephora.com/x", &cfg).contains("go.shopmy.us"));
        let target = "https://www.target.com/p/item";
        assert_eq!(wrap_url(target, &cfg), target);
    }

    #[test]
    fn test_already_wrapped_not_rewrapped() {
        let cfg = LinkwrapConfig {
            syl_enabled: true,
            syl_publisher_id: Some("12345".to_string()),
            ..LinkwrapConfig::default()
        };
        let wrapped = "https://go.shopmy.us/p-12345?url=x";
        assert_eq!(wrap_url(wrapped, &cfg), wrapped);
    }

    #[test]
    fn test_denylist_and_navigation_pass_through() {
        let cfg = tag_cfg();
        for url in [
            "https://gumroad.com/l/gexqp",
            "https://geni.us/abcd",
            "https://www.google.com/maps/place/store",
            "https://youtu.be/dQw4w9WgXcQ",
        ] {
            assert_eq!(wrap_url(url, &cfg), url);
        }
    }

    #[test]
    fn test_wrap_all_handles_markdown_and_plain() {
        let cfg = tag_cfg();
        let text = "try [this](https://www.amazon.com/dp/B08XYZ1234) or https://www.amazon.com/dp/B00ABCDE12";
        let out = wrap_all_affiliates(text, &cfg);
        assert!(out.contains("](https://www.amazon.com/dp/B08XYZ1234?tag=bestie-20)"));
        assert!(out.contains("https://www.amazon.com/dp/B00ABCDE12?tag=bestie-20"));
    }

    #[test]
    fn test_closer_only_in_static_mode() {
        let mut cfg = LinkwrapConfig::default();
        let text = "here you go https://example.com/product";
        assert_eq!(ensure_not_link_ending(text, &cfg), text);

        cfg.closer_mode = CloserMode::Static;
        let closed = ensure_not_link_ending(text, &cfg);
        assert!(closed.ends_with(STATIC_CLOSER));
        // Replies ending in prose are left alone
        assert_eq!(
            ensure_not_link_ending("links above, babe", &cfg),
            "links above, babe"
        );
    }
}
