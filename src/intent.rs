//! Product intent extraction.
//!
//! Turns a shopping-flavored message into a structured query for the
//! catalog: what to search, which category, and a constraint map (price
//! caps, brands, shade, skin type, channel, requested count). Messages
//! with no product intent return `None` and flow to the normal reply path.
//!
//! Everything here is keyword and regex driven. The lexicons are small on
//! purpose; they cover what users of a beauty-leaning bestie actually ask
//! for, plus the pet and printer traffic that showed up in production.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// What the user wants done with the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Find and rank product candidates.
    FindProducts,
    /// Audit a skincare routine for ingredient conflicts.
    RoutineAudit,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::FindProducts => "find_products",
            IntentKind::RoutineAudit => "routine_audit",
        }
    }
}

/// A parsed product request.
#[derive(Debug, Clone, Serialize)]
pub struct ProductIntent {
    pub intent: IntentKind,
    pub query: String,
    pub category: Option<&'static str>,
    pub constraints: Map<String, Value>,
}

impl ProductIntent {
    /// Requested number of picks, when the user asked for a specific count.
    pub fn count(&self) -> Option<usize> {
        self.constraints
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    /// Brands the user explicitly asked for.
    pub fn include_brands(&self) -> Vec<String> {
        self.constraints
            .get("include_brands")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the user signaled price sensitivity.
    pub fn need_budget_alt(&self) -> bool {
        self.constraints
            .get("need_budget_alt")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn channel(&self) -> Option<&str> {
        self.constraints.get("channel").and_then(Value::as_str)
    }
}

// Keyword order matters: the first hit decides the category.
static CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    // skincare
    ("moisturizer", "skincare"),
    ("moisturiser", "skincare"),
    ("cream", "skincare"),
    ("serum", "skincare"),
    ("cleanser", "skincare"),
    // "toner" is guarded by the printer rules below
    ("toner", "skincare"),
    ("sunscreen", "skincare"),
    ("spf", "skincare"),
    ("retinol", "skincare"),
    ("tretinoin", "skincare"),
    ("adapalene", "skincare"),
    ("mask", "skincare"),
    ("eye cream", "skincare"),
    // hair
    ("shampoo", "haircare"),
    ("conditioner", "haircare"),
    ("mask for hair", "haircare"),
    ("hair mask", "haircare"),
    ("hair oil", "haircare"),
    ("heat protectant", "haircare"),
    // makeup
    ("mascara", "makeup"),
    ("foundation", "makeup"),
    ("concealer", "makeup"),
    ("blush", "makeup"),
    ("lip", "makeup"),
    ("tint", "makeup"),
    ("skin tint", "makeup"),
    ("brow", "makeup"),
    // body
    ("body lotion", "bodycare"),
    ("body wash", "bodycare"),
    ("self tanner", "bodycare"),
    ("deodorant", "bodycare"),
    // devices
    ("airwrap", "devices"),
    ("hair dryer", "devices"),
    ("straightener", "devices"),
    ("clarisonic", "devices"),
    // pets
    ("dog", "pets"),
    ("dogs", "pets"),
    ("puppy", "pets"),
    ("kibble", "pets"),
    ("treats", "pets"),
    ("leash", "pets"),
    ("harness", "pets"),
    ("toy", "pets"),
    ("fast fetch", "pets"),
    // printers
    ("printer", "printers"),
    ("inkjet", "printers"),
    ("laser printer", "printers"),
];

static LOWER_PRICE_WORDS: &[&str] = &[
    "cheaper",
    "cheap",
    "cheapest",
    "less expensive",
    "budget",
    "affordable",
    "inexpensive",
    "under",
    "on a budget",
    "not expensive",
    "dupe",
    "alternative",
];

static CHANNEL_HINTS: &[(&str, &str)] = &[
    ("amazon", "amazon"),
    ("prime", "amazon"),
    ("sephora", "sephora"),
    ("ulta", "ulta"),
    ("target", "target"),
    ("walmart", "walmart"),
];

static BRAND_WHITELIST: &[&str] = &[
    "medik8",
    "merit",
    "is clinical",
    "eltamd",
    "la roche-posay",
    "supergoop",
    "cerave",
    "cetaphil",
    "beauty of joseon",
    "k18",
    "olaplex",
    "tatcha",
    "tower 28",
    "rare beauty",
    "maybelline",
    "l’oreal",
    "loreal",
    "dior",
    "charlotte tilbury",
    "nyx",
    "saie",
    "kosas",
    "il makiage",
];

// Multi-letter names first; bare undertone letters only as a last resort.
static SHADE_WORDS: &[&str] = &[
    "ivory", "fair", "light", "medium", "tan", "deep", "neutral", "warm", "cool", "linen",
    "sand", "honey", "bisque", "beige", "almond", "buff", "n", "w", "c",
];

static SKIN_TYPES: &[&str] = &[
    "oily",
    "dry",
    "combination",
    "combo",
    "normal",
    "sensitive",
    "acne-prone",
    "acne",
    "rosacea",
];

static HAIR_FLAGS: &[&str] = &[
    "fine",
    "thick",
    "coarse",
    "curly",
    "wavy",
    "straight",
    "blonde",
    "color-treated",
    "bleach",
    "keratin",
    "extensions",
    "frizzy",
];

static CONCERN_WORDS: &[&str] = &[
    "melasma",
    "hyperpigmentation",
    "breakout",
    "breakouts",
    "acne",
    "wrinkles",
    "aging",
    "anti-aging",
];

static ROUTINE_KEYS: &[&str] = &[
    "routine",
    "am routine",
    "pm routine",
    "morning routine",
    "night routine",
    "overlap",
    "layer",
    "together",
    "alternate nights",
    "same night",
    "use with",
    "mix with",
    "stacking",
    "too much",
];

static INGREDIENT_TOKENS: &[&str] = &[
    "retinol",
    "retinal",
    "tretinoin",
    "adapalene",
    "aha",
    "bha",
    "pha",
    "salicylic",
    "glycolic",
    "lactic",
    "mandelic",
    "benzoyl peroxide",
    "vitamin c",
    "ascorbic",
    "niacinamide",
    "azelaic",
    "arbutin",
    "kojic",
    "peptide",
    "copper peptide",
    "hyaluronic",
    "ceramide",
    "sunscreen",
    "spf",
];

static GENERIC_SHOPPING_WORDS: &[&str] = &[
    "recommend",
    "recommendation",
    "suggest",
    "which",
    "buy",
    "find",
    "product",
    "looking for",
    "need",
    "link",
    "send me",
];

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static INK_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bink\b").unwrap());
static PRINTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bprinter(s)?\b").unwrap());
static INKJET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bink(jet)?\b").unwrap());
static ROUTINE_VERB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"can i (use|layer|mix).+ with ").unwrap());
static COUNT_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:send|show|give)\s+me\s+(?:the\s+)?(\d+)\s+(?:options|links|picks|products)\b")
        .unwrap()
});
static TOP_N_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\btop\s+(\d+)\b").unwrap());
static UNDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bunder\s*\$?\s*(\d{1,4})\b").unwrap());
static PRICE_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d{1,4})\s*-\s*\$\s*(\d{1,4})").unwrap());
static AROUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\baround\s*\$?\s*(\d{1,4})\b").unwrap());
static SPF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bspf\s*(\d{2,3})\b").unwrap());
static WATER_RESIST_MIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(40|80)\s*min").unwrap());
static RETINOID_PCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d(?:\.\d+)?)\s*%\s*(?:retinol|retinal|retinaldehyde)\b").unwrap());
static EXCLUDE_BRAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:not|no|avoid)\s+([A-Za-z][A-Za-z' \-]{1,30})").unwrap());
static SHADE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:shade|color)\s*[:\-]?\s*([A-Za-z0-9\.\-]+)\b").unwrap());
static SHADE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d(\.\d)?[NCW]\b").unwrap());
static SHADE_WORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SHADE_WORDS
        .iter()
        .map(|w| {
            let pat = format!(r"(?i)\b{}\b", regex::escape(w));
            (*w, Regex::new(&pat).unwrap())
        })
        .collect()
});
static SIMILAR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:dupe|alternative|similar|like).*?\b(?:for|of|is)\b\s*([^,.;\n]+)",
        r"(?:similar|like|alternative|alt|dupe|dupes?)\s+(?:to|for)\s+([^,.;\n]+)",
        r"(?:cheaper|less\s+expensive|budget|affordable)\s+(?:version|option)\s+of\s+([^,.;\n]+)",
        r"(?:like)\s+([^,.;\n]+)\s+(?:but|only)\s+(?:cheaper|less\s+expensive|more\s+affordable)",
        r"([^,.;\n]+?)\s+(?:dupes?|alternative)s?$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn norm(s: &str) -> String {
    let collapsed = WS_RE.replace_all(s, " ");
    collapsed
        .trim()
        .trim_matches(|c: char| " ?.!\"'()[]".contains(c))
        .to_string()
}

/// Guess a category from keywords. Printer-ish terms win so "toner" next
/// to "printer" is not misread as skincare.
fn category_guess(low: &str) -> Option<&'static str> {
    if low.contains("printer")
        || low.contains("inkjet")
        || low.contains("laser printer")
        || INK_WORD_RE.is_match(low)
        || low.contains("cartridge")
        || low.contains("toner cartridge")
        || (low.contains("toner") && low.contains("printer"))
    {
        return Some("printers");
    }
    CATEGORY_KEYWORDS
        .iter()
        .find(|(kw, _)| low.contains(kw))
        .map(|(_, cat)| *cat)
}

fn detect_channel(low: &str) -> Option<&'static str> {
    CHANNEL_HINTS
        .iter()
        .find(|(hint, _)| low.contains(hint))
        .map(|(_, chan)| *chan)
}

fn detect_count(low: &str) -> Option<u64> {
    if let Some(caps) = COUNT_PHRASE_RE.captures(low) {
        return caps[1].parse().ok();
    }
    if let Some(caps) = TOP_N_RE.captures(low) {
        return caps[1].parse().ok();
    }
    if ["one pick", "one option", "single pick"]
        .iter()
        .any(|p| low.contains(p))
    {
        return Some(1);
    }
    None
}

fn parse_price_qualifiers(low: &str, c: &mut Map<String, Value>) {
    if LOWER_PRICE_WORDS.iter().any(|w| low.contains(w)) {
        c.insert("price".into(), json!("lower"));
        c.insert("need_budget_alt".into(), json!(true));
    }
    if let Some(caps) = UNDER_RE.captures(low) {
        if let Ok(n) = caps[1].parse::<i64>() {
            c.insert("max_price".into(), json!(n));
        }
    }
    if let Some(caps) = PRICE_RANGE_RE.captures(low) {
        if let (Ok(lo), Ok(hi)) = (caps[1].parse::<i64>(), caps[2].parse::<i64>()) {
            c.insert("price_range".into(), json!([lo.min(hi), lo.max(hi)]));
        }
    }
    if !c.contains_key("price_range") && !c.contains_key("max_price") {
        if let Some(caps) = AROUND_RE.captures(low) {
            if let Ok(n) = caps[1].parse::<i64>() {
                c.insert("target_price".into(), json!(n));
            }
        }
    }
}

fn parse_speed_coupons(low: &str, c: &mut Map<String, Value>) {
    if low.contains("prime") || low.contains("same day") || low.contains("today") {
        c.insert("speed".into(), json!("fast"));
    }
    if low.contains("coupon")
        || low.contains("promo")
        || low.contains("discount")
        || low.contains("code")
    {
        c.insert("coupon_search".into(), json!(true));
    }
}

fn parse_sunscreen_filters(low: &str, c: &mut Map<String, Value>) {
    if let Some(caps) = SPF_RE.captures(low) {
        if let Ok(n) = caps[1].parse::<i64>() {
            c.insert("spf_exact".into(), json!(n));
        }
    }
    if low.contains("mineral") || low.contains("zinc") || low.contains("titanium") {
        c.insert("mineral_only".into(), json!(true));
    }
    if low.contains("chemical") {
        c.insert("chemical_ok".into(), json!(true));
    }
    if low.contains("tinted") {
        c.insert("tinted".into(), json!(true));
    }
    if low.contains("water resistant") || low.contains("water-resistant") {
        c.insert("water_resistant".into(), json!(true));
        if let Some(caps) = WATER_RESIST_MIN_RE.captures(low) {
            if let Ok(n) = caps[1].parse::<i64>() {
                c.insert("water_resistant_min".into(), json!(n));
            }
        }
    }
    if low.contains("pa++++") {
        c.insert("pa_rating".into(), json!("PA++++"));
    }
    if low.contains("fragrance-free") || low.contains("fragrance free") {
        c.insert("fragrance_free".into(), json!(true));
    }
    if low.contains("non-comedogenic") || low.contains("non comedogenic") {
        c.insert("non_comedogenic".into(), json!(true));
    }
    if low.contains("oil-free") || low.contains("oil free") {
        c.insert("oil_free".into(), json!(true));
    }
    // Lash and nail extensions dissolve under chemical filters
    if low.contains("extensions") && low.contains("pink") {
        c.insert("mineral_only".into(), json!(true));
    }
}

fn parse_retinoid_strength(low: &str, c: &mut Map<String, Value>) {
    if let Some(caps) = RETINOID_PCT_RE.captures(low) {
        if let Ok(pct) = caps[1].parse::<f64>() {
            c.insert("retinoid_percent".into(), json!(pct));
        }
    }
    if low.contains("starter") || low.contains("beginner") {
        c.insert("retinoid_level".into(), json!("starter"));
    }
    if low.contains("strong") || low.contains("max") || low.contains("intense") {
        c.insert("retinoid_level".into(), json!("strong"));
    }
}

fn extract_brands(low: &str) -> (Vec<String>, Vec<String>) {
    let include: BTreeSet<String> = BRAND_WHITELIST
        .iter()
        .filter(|b| low.contains(*b))
        .map(|b| b.to_string())
        .collect();

    let mut exclude: Vec<String> = Vec::new();
    for caps in EXCLUDE_BRAND_RE.captures_iter(low) {
        let name = norm(&caps[1]).to_lowercase();
        if !name.is_empty() && !exclude.contains(&name) {
            exclude.push(name);
        }
    }
    (include.into_iter().collect(), exclude)
}

fn extract_shade(text: &str) -> Option<String> {
    if let Some(caps) = SHADE_LABEL_RE.captures(text) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(m) = SHADE_CODE_RE.find(text) {
        return Some(m.as_str().trim().to_string());
    }
    for (word, pat) in SHADE_WORD_PATTERNS.iter() {
        if pat.is_match(text) {
            return Some(word.to_string());
        }
    }
    None
}

fn skin_hair_flags(low: &str, c: &mut Map<String, Value>) {
    let skins: BTreeSet<&str> = SKIN_TYPES.iter().filter(|t| low.contains(*t)).copied().collect();
    let hairs: BTreeSet<&str> = HAIR_FLAGS.iter().filter(|t| low.contains(*t)).copied().collect();
    let concerns: BTreeSet<&str> = CONCERN_WORDS
        .iter()
        .filter(|t| low.contains(*t))
        .copied()
        .collect();
    if !skins.is_empty() {
        c.insert("skin_types".into(), json!(skins));
    }
    if !hairs.is_empty() {
        c.insert("hair_flags".into(), json!(hairs));
    }
    if !concerns.is_empty() {
        c.insert("concerns".into(), json!(concerns));
    }
    if low.contains("sensitive") {
        c.insert("fragrance_free".into(), json!(true));
        c.insert("non_comedogenic".into(), json!(true));
    }
    if low.contains("pregnant") || low.contains("pregnancy") {
        c.insert("pregnancy_safe".into(), json!(true));
    }
    if low.contains("puppy") {
        c.insert("pet_age".into(), json!("puppy"));
    }
    if low.contains("dachshund") {
        c.insert("dog_breed".into(), json!("dachshund"));
    }
}

/// Extract a product request from a message, or `None` when there is none.
pub fn extract_product_intent(user_text: &str) -> Option<ProductIntent> {
    if user_text.is_empty() {
        return None;
    }

    let t = norm(user_text);
    let low = t.to_lowercase();
    let mut constraints = Map::new();

    parse_price_qualifiers(&low, &mut constraints);
    parse_speed_coupons(&low, &mut constraints);

    // Routine and layering questions first; those are audits, not shopping
    if ROUTINE_KEYS.iter().any(|k| low.contains(k)) || ROUTINE_VERB_RE.is_match(&low) {
        let found: BTreeSet<&str> = INGREDIENT_TOKENS
            .iter()
            .filter(|tok| low.contains(*tok))
            .copied()
            .collect();
        let mut c = Map::new();
        c.insert("ingredients".into(), json!(found));
        return Some(ProductIntent {
            intent: IntentKind::RoutineAudit,
            query: user_text.to_string(),
            category: Some("skincare"),
            constraints: c,
        });
    }

    // Explicit printer or ink traffic
    if PRINTER_RE.is_match(&low)
        || INKJET_RE.is_match(&low)
        || low.contains("toner cartridge")
        || (low.contains("toner") && low.contains("printer"))
    {
        return Some(ProductIntent {
            intent: IntentKind::FindProducts,
            query: user_text.to_string(),
            category: Some("printers"),
            constraints,
        });
    }

    if low.contains("sunscreen") || low.contains("spf") {
        parse_sunscreen_filters(&low, &mut constraints);
    }
    if low.contains("retinol") || low.contains("retinal") || low.contains("retinaldehyde") {
        parse_retinoid_strength(&low, &mut constraints);
    }

    if let Some(channel) = detect_channel(&low) {
        constraints.insert("channel".into(), json!(channel));
    }
    if let Some(count) = detect_count(&low).filter(|n| *n > 0) {
        constraints.insert("count".into(), json!(count));
    }

    let (inc_brands, exc_brands) = extract_brands(&low);
    if !inc_brands.is_empty() {
        constraints.insert("include_brands".into(), json!(inc_brands));
    }
    if !exc_brands.is_empty() {
        constraints.insert("exclude_brands".into(), json!(exc_brands));
    }

    skin_hair_flags(&low, &mut constraints);

    if let Some(shade) = extract_shade(user_text) {
        constraints.insert("shade".into(), json!(shade));
    }

    // "Similar to X" and "dupe for X" carry an explicit target
    for pat in SIMILAR_PATTERNS.iter() {
        if let Some(caps) = pat.captures(&low) {
            let target = norm(&caps[1]);
            debug!(target = %target, "parsed similar-to product target");
            return Some(ProductIntent {
                intent: IntentKind::FindProducts,
                query: target,
                category: category_guess(&low),
                constraints,
            });
        }
    }

    if GENERIC_SHOPPING_WORDS.iter().any(|g| low.contains(g)) {
        return Some(ProductIntent {
            intent: IntentKind::FindProducts,
            query: user_text.to_string(),
            category: category_guess(&low),
            constraints,
        });
    }

    // Bare category nouns like "moisturizer" or "fast fetch"
    if let Some(cat) = category_guess(&low) {
        return Some(ProductIntent {
            intent: IntentKind::FindProducts,
            query: user_text.to_string(),
            category: Some(cat),
            constraints,
        });
    }

    None
}
