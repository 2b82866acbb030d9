//! Offer ranking.
//!
//! Candidate products are scored on sponsorship, commission, expected
//! earnings per click, review quality, and brand fit, minus a penalty for
//! high return rates. Near-ties break toward Amazon, which converts better
//! over SMS. Weights are env-tunable so the mix can be adjusted without a
//! deploy.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::env_parse;
use crate::linkwrap::{with_associate_tag, LinkwrapConfig};

static AMAZON_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|\.)amazon\.").unwrap());
static ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/(?:dp|gp/product)/([A-Z0-9]{10})(?:[/?]|$)").unwrap());

/// A candidate product offer, before scoring.
#[derive(Debug, Clone, Default)]
pub struct Offer {
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
    pub commission_pct: f64,
    pub sponsor_bid_cents: i64,
    pub est_ctr: f64,
    pub est_conv_rate: f64,
    pub rating: f64,
    pub rating_votes: i64,
    pub return_rate: f64,
}

/// An offer with its computed score and affiliate-ready URL.
#[derive(Debug, Clone)]
pub struct ScoredOffer {
    pub offer: Offer,
    pub final_url: String,
    pub score: f64,
}

/// Scoring weights. Each component lands in `[0, 1]` before weighting.
#[derive(Debug, Clone)]
pub struct MonetizeConfig {
    pub w_sponsor: f64,
    pub w_commission: f64,
    pub w_epc: f64,
    pub w_quality: f64,
    pub w_brand: f64,
    pub w_return_penalty: f64,
    /// Score gap inside which an Amazon runner-up takes the top slot.
    pub amazon_tie_bonus: f64,
}

impl Default for MonetizeConfig {
    fn default() -> Self {
        Self {
            w_sponsor: 0.35,
            w_commission: 0.35,
            w_epc: 0.20,
            w_quality: 0.06,
            w_brand: 0.02,
            w_return_penalty: 0.02,
            amazon_tie_bonus: 0.03,
        }
    }
}

impl MonetizeConfig {
    /// Read weights from `MONETIZE_W_*` and `AMAZON_TIE_BONUS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            w_sponsor: env_parse("MONETIZE_W_SPONSOR", d.w_sponsor),
            w_commission: env_parse("MONETIZE_W_COMMISSION", d.w_commission),
            w_epc: env_parse("MONETIZE_W_EPC", d.w_epc),
            w_quality: env_parse("MONETIZE_W_QUALITY", d.w_quality),
            w_brand: env_parse("MONETIZE_W_BRAND", d.w_brand),
            w_return_penalty: env_parse("MONETIZE_W_RETURN_P", d.w_return_penalty),
            amazon_tie_bonus: env_parse("AMAZON_TIE_BONUS", d.amazon_tie_bonus),
        }
    }
}

fn is_amazon(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| AMAZON_HOST_RE.is_match(h)))
        .unwrap_or(false)
}

/// Score a single offer against the configured weights.
///
/// Sponsorship saturates at a 50-cent bid. Commission is normalized against
/// a $300 price ceiling so luxury items do not dominate. EPC assumes a $25
/// basket when the price is unknown.
pub fn score_offer(offer: &Offer, include_brands: &[String], cfg: &MonetizeConfig) -> f64 {
    let sponsor = (offer.sponsor_bid_cents as f64 / 50.0).min(1.0);

    let commission = match offer.price {
        Some(price) => (offer.commission_pct / 100.0) * price.min(300.0) / 300.0,
        None => offer.commission_pct / 100.0,
    };

    let epc = (offer.est_ctr
        * offer.est_conv_rate
        * (offer.commission_pct / 100.0)
        * offer.price.unwrap_or(25.0))
    .min(1.0);

    let votes = if offer.rating_votes <= 0 {
        0.0
    } else {
        (((offer.rating_votes as f64) + 1.0).log10() / 3.0).min(1.0)
    };
    let quality = 0.7 * (offer.rating / 5.0).clamp(0.0, 1.0) + 0.3 * votes;

    let title = offer.title.to_lowercase();
    let brand_fit = if include_brands
        .iter()
        .any(|b| !b.is_empty() && title.contains(&b.to_lowercase()))
    {
        1.0
    } else {
        0.0
    };

    let penalty = if offer.return_rate <= 0.10 {
        0.0
    } else {
        ((offer.return_rate - 0.10) / 0.20).min(1.0)
    };

    cfg.w_sponsor * sponsor
        + cfg.w_commission * commission
        + cfg.w_epc * epc
        + cfg.w_quality * quality
        + cfg.w_brand * brand_fit
        - cfg.w_return_penalty * penalty
}

fn dedupe_key(scored: &ScoredOffer) -> String {
    if let Some(caps) = ASIN_RE.captures(&scored.final_url) {
        return caps[1].to_uppercase();
    }
    scored.offer.title.to_lowercase().trim().to_string()
}

/// Rank offers best-first.
///
/// Each URL gets its associate tag before scoring so the dedupe key sees
/// the final form. After the sort, an Amazon offer within the tie bonus of
/// a non-Amazon leader is promoted, then duplicates (same ASIN or same
/// title) are dropped keeping the better-ranked one.
pub fn rank(
    offers: &[Offer],
    include_brands: &[String],
    cfg: &MonetizeConfig,
    wrap: &LinkwrapConfig,
) -> Vec<ScoredOffer> {
    let mut ranked: Vec<ScoredOffer> = offers
        .iter()
        .map(|offer| {
            let final_url = with_associate_tag(&offer.url, wrap.amazon_associate_tag.as_deref());
            let score = score_offer(offer, include_brands, cfg);
            ScoredOffer {
                offer: offer.clone(),
                final_url,
                score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if ranked.len() >= 2 {
        let gap = ranked[0].score - ranked[1].score;
        if gap <= cfg.amazon_tie_bonus
            && is_amazon(&ranked[1].final_url)
            && !is_amazon(&ranked[0].final_url)
        {
            ranked.swap(0, 1);
        }
    }

    let mut seen = HashSet::new();
    ranked.retain(|s| seen.insert(dedupe_key(s)));
    ranked
}

/// The best `k` offers, ranked.
pub fn top_k(
    offers: &[Offer],
    include_brands: &[String],
    k: usize,
    cfg: &MonetizeConfig,
    wrap: &LinkwrapConfig,
) -> Vec<ScoredOffer> {
    let mut ranked = rank(offers, include_brands, cfg, wrap);
    ranked.truncate(k);
    ranked
}

/// The single best offer, if any.
pub fn choose_best(
    offers: &[Offer],
    include_brands: &[String],
    cfg: &MonetizeConfig,
    wrap: &LinkwrapConfig,
) -> Option<ScoredOffer> {
    top_k(offers, include_brands, 1, cfg, wrap).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(title: &str, url: &str) -> Offer {
        Offer {
            title: title.to_string(),
            url: url.to_string(),
            ..Offer::default()
        }
    }

    #[test]
    fn test_sponsor_bid_saturates() {
        let cfg = MonetizeConfig::default();
        let mut a = offer("a", "https://shop.example/a");
        a.sponsor_bid_cents = 50;
        let mut b = offer("b", "https://shop.example/b");
        b.sponsor_bid_cents = 500;
        assert_eq!(
            score_offer(&a, &[], &cfg),
            score_offer(&b, &[], &cfg)
        );
    }

    #[test]
    fn test_commission_normalized_by_price() {
        let cfg = MonetizeConfig::default();
        let mut cheap = offer("cheap", "https://shop.example/c");
        cheap.commission_pct = 10.0;
        cheap.price = Some(30.0);
        let mut unknown = offer("unknown", "https://shop.example/u");
        unknown.commission_pct = 10.0;
        // Unknown price scores the raw rate, priced items scale by price
        assert!(score_offer(&unknown, &[], &cfg) > score_offer(&cheap, &[], &cfg));
    }

    #[test]
    fn test_return_rate_penalty_kicks_in_above_threshold() {
        let cfg = MonetizeConfig::default();
        let mut low = offer("low", "https://shop.example/l");
        low.return_rate = 0.10;
        let mut high = offer("high", "https://shop.example/h");
        high.return_rate = 0.30;
        assert!(score_offer(&low, &[], &cfg) > score_offer(&high, &[], &cfg));
    }

    #[test]
    fn test_brand_match_bumps_score() {
        let cfg = MonetizeConfig::default();
        let item = offer("CeraVe Daily Moisturizer", "https://shop.example/c");
        let brands = vec!["cerave".to_string()];
        assert!(score_offer(&item, &brands, &cfg) > score_offer(&item, &[], &cfg));
    }

    #[test]
    fn test_amazon_wins_near_ties() {
        let cfg = MonetizeConfig::default();
        let wrap = LinkwrapConfig::default();
        let mut other = offer("serum a", "https://www.sephora.com/a");
        other.rating = 4.8;
        other.rating_votes = 1000;
        let mut amazon = offer("serum b", "https://www.amazon.com/dp/B08XYZ1234");
        amazon.rating = 4.7;
        amazon.rating_votes = 1000;

        let ranked = rank(&[other.clone(), amazon.clone()], &[], &cfg, &wrap);
        assert!(is_amazon(&ranked[0].final_url));

        // A decisive gap is not a tie
        other.sponsor_bid_cents = 50;
        let ranked = rank(&[other, amazon], &[], &cfg, &wrap);
        assert!(!is_amazon(&ranked[0].final_url));
    }

    #[test]
    fn test_duplicate_asin_deduped() {
        let cfg = MonetizeConfig::default();
        let wrap = LinkwrapConfig::default();
        let a = offer("retinol cream", "https://www.amazon.com/dp/B08XYZ1234");
        let b = offer(
            "retinol cream jumbo",
            "https://www.amazon.com/gp/product/B08XYZ1234?ref=x",
        );
        let ranked = rank(&[a, b], &[], &cfg, &wrap);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_choose_best_returns_top() {
        let cfg = MonetizeConfig::default();
        let wrap = LinkwrapConfig::default();
        let mut good = offer("good", "https://shop.example/g");
        good.rating = 5.0;
        good.rating_votes = 500;
        let meh = offer("meh", "https://shop.example/m");

        let best = choose_best(&[meh, good], &[], &cfg, &wrap).unwrap();
        assert_eq!(best.offer.title, "good");
        assert!(choose_best(&[], &[], &cfg, &wrap).is_none());
    }
}
