//! Product candidate lookup.
//!
//! A curated catalog stands in for live retailer search. Entries link to
//! Amazon search pages, which never 404 and still monetize once the link
//! wrapper rewrites them. Candidates are normalized to title, URL, and
//! merchant host before ranking.

use tracing::debug;
use url::Url;

use crate::intent::ProductIntent;

/// A normalized product candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub merchant: Option<String>,
    /// One-line pitch for the pick, when the catalog has one.
    pub reason: Option<String>,
}

fn amazon_search_link(name: &str) -> String {
    let q = urlencoding::encode(name).replace("%20", "+");
    format!("https://www.amazon.com/s?k={q}")
}

fn is_amazon(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase().contains("amazon.")))
        .unwrap_or(false)
}

/// Look up curated candidates for a query.
///
/// Only a handful of high-traffic asks are covered; everything else comes
/// back empty and the reply falls back to conversational mode.
pub fn fetch_products(query: &str) -> Vec<Candidate> {
    let q = query.to_lowercase();

    if q.contains("youth intensive cream") || q.contains("is clinical youth") {
        return vec![
            Candidate {
                title: "L'Oréal Revitalift Triple Power Anti-Aging Moisturizer".to_string(),
                reason: Some(
                    "Retinol + Vitamin C + HA combo for firming/plumping; rich texture; usually <$35."
                        .to_string(),
                ),
                url: amazon_search_link("L'Oreal Revitalift Triple Power Anti-Aging Moisturizer"),
                merchant: None,
            },
            Candidate {
                title: "Olay Regenerist Micro-Sculpting Cream (Fragrance-Free)".to_string(),
                reason: Some(
                    "Peptides + niacinamide + HA for bounce and barrier support; typically $25–35."
                        .to_string(),
                ),
                url: amazon_search_link("Olay Regenerist Micro-Sculpting Cream fragrance free"),
                merchant: None,
            },
            Candidate {
                title: "RoC Retinol Correxion Max Daily Hydration Cream".to_string(),
                reason: Some(
                    "Retinol for smoothing + glycerin for cushion; commonly <$35.".to_string(),
                ),
                url: amazon_search_link("RoC Retinol Correxion Max Daily Hydration Cream"),
                merchant: None,
            },
        ];
    }

    Vec::new()
}

fn intent_to_query(intent: &ProductIntent) -> Option<String> {
    let q = intent.query.trim();
    if !q.is_empty() {
        return Some(q.to_string());
    }
    intent.category.map(str::to_string)
}

/// Build normalized candidates for a parsed intent.
///
/// Fills in the merchant from the URL host when the catalog left it blank.
pub fn build_candidates(intent: &ProductIntent) -> Vec<Candidate> {
    let Some(query) = intent_to_query(intent) else {
        debug!("no usable query in intent, no candidates");
        return Vec::new();
    };

    let mut candidates = fetch_products(&query);
    for c in &mut candidates {
        if c.merchant.is_none() {
            c.merchant = Url::parse(&c.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string));
        }
    }
    debug!(count = candidates.len(), query = %query, "built product candidates");
    candidates
}

/// Stable sort putting `amazon.*` URLs first, preserving relative order
/// otherwise.
pub fn prefer_amazon_first(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| !is_amazon(&c.url));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::extract_product_intent;

    #[test]
    fn test_curated_lookup() {
        let hits = fetch_products("dupe for IS Clinical Youth Intensive Cream");
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|c| c.url.starts_with("https://www.amazon.com/s?k=")));
        assert!(hits[0].title.contains("Revitalift"));
    }

    #[test]
    fn test_unknown_query_empty() {
        assert!(fetch_products("left-handed smoke shifter").is_empty());
    }

    #[test]
    fn test_candidates_get_merchant_host() {
        let intent = extract_product_intent("dupe for is clinical youth intensive cream").unwrap();
        let candidates = build_candidates(&intent);
        assert_eq!(candidates.len(), 3);
        assert!(candidates
            .iter()
            .all(|c| c.merchant.as_deref() == Some("www.amazon.com")));
    }

    #[test]
    fn test_prefer_amazon_first_is_stable() {
        let mk = |title: &str, url: &str| Candidate {
            title: title.to_string(),
            url: url.to_string(),
            merchant: None,
            reason: None,
        };
        let sorted = prefer_amazon_first(vec![
            mk("a", "https://www.sephora.com/a"),
            mk("b", "https://www.amazon.com/dp/B000000001"),
            mk("c", "https://www.ulta.com/c"),
            mk("d", "https://www.amazon.com/dp/B000000002"),
        ]);
        let titles: Vec<&str> = sorted.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "a", "c"]);
    }
}
