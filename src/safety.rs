//! Conversation guardrails.
//!
//! Runs first in the reply pipeline, before any persona or product logic.
//! The voice stays warm and adult: swearing is fine, relationship and
//! intimacy talk is fine. Only messages that create real legal or safety
//! exposure are blocked, and each block returns a short, kind reply rather
//! than a lecture.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Risk categories a message can trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Risk {
    SelfHarm,
    HarmOthers,
    Illegal,
    Weapons,
    EatingDisorder,
    MedDosing,
    DrugMisuse,
    /// Any sexual content involving minors.
    MinorSex,
    /// Explicit step-by-step sexual technique. High-level intimacy talk is fine.
    AdultExplicitHowto,
    Hate,
    Defamation,
    Privacy,
    FinancePromise,
    LegalAdvice,
    /// Explosives, high voltage, toxic mixes and similar hazards.
    DangerousDiy,
    StalkingSurveillance,
    /// The user self-reported being under 18.
    UnderageDisclosed,
    /// Diagnosis requests without a clinician.
    MedDiagnosis,
    Extremism,
}

impl Risk {
    /// Stable name for logging and analytics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::SelfHarm => "SELF_HARM",
            Risk::HarmOthers => "HARM_OTHERS",
            Risk::Illegal => "ILLEGAL",
            Risk::Weapons => "WEAPONS",
            Risk::EatingDisorder => "EATING_DISORDER",
            Risk::MedDosing => "MED_DOSING",
            Risk::DrugMisuse => "DRUG_MISUSE",
            Risk::MinorSex => "MINOR_SEX",
            Risk::AdultExplicitHowto => "ADULT_EXPLICIT_HOWTO",
            Risk::Hate => "HATE",
            Risk::Defamation => "DEFAMATION",
            Risk::Privacy => "PRIVACY",
            Risk::FinancePromise => "FINANCE_PROMISE",
            Risk::LegalAdvice => "LEGAL_ADVICE",
            Risk::DangerousDiy => "DANGEROUS_DIY",
            Risk::StalkingSurveillance => "STALKING_SURVEILLANCE",
            Risk::UnderageDisclosed => "UNDERAGE_DISCLOSED",
            Risk::MedDiagnosis => "MED_DIAGNOSIS",
            Risk::Extremism => "EXTREMISM",
        }
    }
}

static AGE_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(i\s*(am|'m)\s*(\d{1,2}))\b").unwrap());

// Patterns run against lowercased text, so literals stay lowercase.
static PATTERNS: LazyLock<Vec<(Risk, Vec<Regex>)>> = LazyLock::new(|| {
    fn compile(pats: &[&str]) -> Vec<Regex> {
        pats.iter().map(|p| Regex::new(p).unwrap()).collect()
    }
    vec![
        (
            Risk::SelfHarm,
            compile(&[
                r"\bkill myself\b",
                r"\bsuicid",
                r"\bunalive\b",
                r"\bkms\b",
                r"\bexit\s*bag\b",
                r"\bhelium\s*hood\b",
                r"\bnitrogen\b.*\bdeath\b",
                r"\bhow to die\b",
                r"\bbeautiful suicide\b",
                r"\b(end my life|no reason to live)\b",
            ]),
        ),
        (
            Risk::HarmOthers,
            compile(&[
                r"\bkill (him|her|them)\b",
                r"\bhow to (hurt|poison)\b",
                r"\bmake (them|someone) suffer\b",
            ]),
        ),
        (
            Risk::Weapons,
            compile(&[
                r"\bghost\s*gun\b",
                r"\bauto\s*sear\b",
                r"\bconvert\b.*\b(full|auto)\b",
                r"\b(make|build).*\b(bomb|explosive|silencer)\b",
            ]),
        ),
        (
            Risk::Illegal,
            compile(&[
                r"\bbreak\s*in(to)?\b",
                r"\bshoplift\b",
                r"\bsteal\b",
                r"\bfake\s*id\b",
                r"\bhack(ing)?\b",
                r"\bdoxx?\b",
                r"\bkey\s*logger\b",
                r"\bbank\s*fraud\b",
            ]),
        ),
        (
            Risk::EatingDisorder,
            compile(&[
                r"\bthinspo\b",
                r"\bpro-?ana\b",
                r"\bpurge\b",
                r"\blaxative.*weight\b",
                r"\bhow to avoid eating\b",
                r"\bstarve\b",
                r"\bchew\s*and\s*spit\b",
            ]),
        ),
        (
            Risk::MedDosing,
            compile(&[
                r"\b\d+\s*(mg|mcg|iu)\b.*\b(take|dose|stack)\b",
                r"\bhow much\b.*\b(prescription|med|pill|injection)\b",
                r"\bcombine\b.*\b(ssri|maoi|benzo|steroid|tirzepatide|semaglutide)\b.*\b(dose|microdose)\b",
            ]),
        ),
        (
            Risk::DrugMisuse,
            compile(&[
                r"\bcook\s*meth\b",
                r"\bfreebase\b",
                r"\bfentanyl\b.*\bdose\b",
                r"\b(xanax|benzo)\b.*\b(alcohol|booze)\b",
                r"\bhow to get high\b.*\b(pills|syrup)\b",
            ]),
        ),
        (
            Risk::MinorSex,
            compile(&[
                r"\b(13|14|15|16|17)\b.*\bsex\b",
                r"\bminor\b.*\bsex\b",
                r"\bgroom(ing)?\b",
                r"\bunderage\b.*\b(sex|nudes|pics)\b",
            ]),
        ),
        (
            Risk::AdultExplicitHowto,
            compile(&[
                r"\bhow to\b.*\b(perform|do)\b.*\b(anal|oral|blowjob|deepthroat|fisting)\b",
                r"\bstep[-\s]?by[-\s]?step\b.*\b(sex|anal|oral)\b",
                r"\bbest way to\b.*\bmake (her|him|them) (orgasm|squirt|cum)\b",
                r"\bdiagram\b.*\bsex position\b",
                r"\bunsafe\b.*\bchoking\b",
            ]),
        ),
        (
            Risk::Hate,
            compile(&[
                r"\b(gas the|lynch|exterminate)\b",
                r"\b(?:slur|kike|wetback|chink|fag|tranny)\b",
            ]),
        ),
        (
            Risk::Defamation,
            compile(&[
                r"\bis it true\b.*\b(criminal|rapist|fraud)\b.*\b(@|\b[a-z]+ [a-z]+)\b",
                r"\bexpose\b.*\bscam\b.*\b(person|private)\b",
            ]),
        ),
        (
            Risk::Privacy,
            compile(&[
                r"\baddress|phone|email|ssn|social security|location\b.*\b(find|get|trace|track)\b",
                r"\b(ip|mac)\b.*\blookup\b",
            ]),
        ),
        (
            Risk::FinancePromise,
            compile(&[
                r"\bguarantee(d|)\b.*\breturns?\b",
                r"\binsider\b.*\btip\b",
                r"\bsurefire\b.*\bprofit\b",
            ]),
        ),
        (
            Risk::LegalAdvice,
            compile(&[
                r"\bbeat the case\b",
                r"\bhow to avoid charges\b",
                r"\bhide evidence\b",
            ]),
        ),
        (
            Risk::DangerousDiy,
            compile(&[
                r"\bhigh voltage\b.*\bhow to\b",
                r"\bmix\b.*\bbleach\b.*\bammonia\b",
                r"\bhandle\b.*\bmercury|cyanide|nitro\b",
            ]),
        ),
        (
            Risk::StalkingSurveillance,
            compile(&[
                r"\bairtag\b.*\btrack\b.*\b(person|partner)\b",
                r"\bhack\b.*\b(phone|icloud)\b",
                r"\bspyware\b|\bstalkerware\b",
                r"\bhidden camera\b.*\bsetup\b",
            ]),
        ),
        (
            Risk::MedDiagnosis,
            compile(&[
                r"\bdo i have\b.*\bdiagnose\b",
                r"\bwhat illness is\b",
                r"\bself[-\s]?diagnos",
            ]),
        ),
        (
            Risk::Extremism,
            compile(&[
                r"\bjoin\b.*\b(isis|al[-\s]?qaeda)\b",
                r"\bcreate\b.*\bmanifesto\b.*\battack\b",
            ]),
        ),
    ]
});

/// Redirect for users who disclose they are under 18.
pub const UNDERAGE_REDIRECT: &str = "Thanks for trusting me. Because you said you’re under 18, I keep things age-appropriate. \
If you’re in danger or feel unsafe, contact a trusted adult or your local emergency number right now. \
I’m here to help with safe topics, school, friendships, and everyday support.";

/// Offered instead of explicit technique: the adult-intimacy topics that are in bounds.
pub const INTIMACY_SAFE_HELP: &str = "Adult intimacy is fair game. I avoid explicit step-by-step sexual technique, \
but I can help you with consent scripts, boundaries, communication, safety, preparation, and aftercare. \
Tell me what you want help with and I’ll keep it respectful and useful.";

fn crisis_reply(user_country: &str) -> String {
    let pre = "I’m really glad you told me. You matter and I want you safe.\n";
    if user_country.eq_ignore_ascii_case("US") {
        format!("{pre}If you’re in immediate danger, call 911 now. You can call or text 988 for the Suicide and Crisis Lifeline. I’m here with you.")
    } else {
        format!("{pre}If you’re in immediate danger, call your local emergency number now. You deserve immediate help, and I’m here with you.")
    }
}

fn refusal(risk: Risk) -> &'static str {
    match risk {
        Risk::HarmOthers => "I can’t help with hurting someone. If you’re angry or overwhelmed, I can help you cool off and choose a safer next move.",
        Risk::Weapons => "I can’t help with weapons or conversion instructions. If safety is the concern, I can share nonviolent security tips.",
        Risk::Illegal => "I can’t help with illegal activity. If you want legal alternatives or education, I’m in.",
        Risk::EatingDisorder => "I can’t help with harming your body. If food and feelings are loud, I can offer kind support and resources.",
        Risk::DrugMisuse => "I can’t help with illicit drug use or dangerous combos. I can share general harm-reduction resources or suggest talking with a professional.",
        Risk::MedDosing => "I can’t give dosing or personalized medical instructions. I can explain general concepts and help you prep questions for a clinician.",
        Risk::MinorSex => "I can’t engage with sexual topics involving anyone under 18. If you’re in an unsafe situation, contact a trusted adult or your local emergency number.",
        Risk::AdultExplicitHowto => "I won’t give explicit sexual instructions. I can help with consent, communication, safety, prep, aftercare, and how to talk to a partner.",
        Risk::Hate => "I won’t produce hateful or violent content. Happy to help with respectful discussion or learning.",
        Risk::Defamation => "I can’t make or spread accusations about private people. I can explain how to verify sources or discuss the topic generally.",
        Risk::Privacy => "I can’t share or dig up private personal data. I can help you find public, consented info instead.",
        Risk::FinancePromise => "I can’t promise outcomes or share insider info. I can walk you through risk and the math so you can decide.",
        Risk::LegalAdvice => "I’m not a lawyer and I can’t advise on evading law enforcement. I can help you prep smart questions for a licensed attorney.",
        Risk::DangerousDiy => "I can’t walk you through hazardous procedures. I can suggest safer alternatives or pro services.",
        Risk::StalkingSurveillance => "I can’t help with spying or tracking people. If you’re concerned about safety, I can discuss protective options.",
        Risk::MedDiagnosis => "I can’t diagnose or replace a clinician. I can explain possibilities and help you plan what to ask a professional.",
        Risk::Extremism => "I won’t assist with extremist activity. I can discuss history or safety topics at a high level if that helps.",
        Risk::SelfHarm | Risk::UnderageDisclosed => "",
    }
}

fn detect_underage(text: &str) -> bool {
    AGE_DECL_RE
        .captures(text)
        .and_then(|c| c.get(3))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .map(|age| age < 18)
        .unwrap_or(false)
}

fn scan(text: &str) -> HashSet<Risk> {
    let t = text.to_lowercase();
    let mut hits = HashSet::new();
    if detect_underage(&t) {
        hits.insert(Risk::UnderageDisclosed);
    }
    for (risk, pats) in PATTERNS.iter() {
        if pats.iter().any(|p| p.is_match(&t)) {
            hits.insert(*risk);
        }
    }
    hits
}

/// Check a message and return a safety reply when it must be blocked or
/// redirected. `None` means the pipeline proceeds normally.
///
/// Priority order: self-harm gets crisis support, minors get redirected
/// away from sexual content, then violent and illegal buckets, health and
/// substance buckets, speech and privacy buckets, and finally the explicit
/// how-to redirect.
pub fn safety_guard(text: &str, user_country: &str, user_is_minor: Option<bool>) -> Option<String> {
    let risks = scan(text);

    let minor = user_is_minor.unwrap_or(risks.contains(&Risk::UnderageDisclosed));

    if risks.contains(&Risk::SelfHarm) {
        return Some(crisis_reply(user_country));
    }

    if minor && (risks.contains(&Risk::MinorSex) || text.to_lowercase().contains("sex")) {
        return Some(UNDERAGE_REDIRECT.to_string());
    }

    // Sexualizing minors is refused no matter who is asking
    if risks.contains(&Risk::MinorSex) {
        return Some(refusal(Risk::MinorSex).to_string());
    }

    for r in [
        Risk::HarmOthers,
        Risk::Weapons,
        Risk::Extremism,
        Risk::Illegal,
        Risk::StalkingSurveillance,
        Risk::DangerousDiy,
    ] {
        if risks.contains(&r) {
            return Some(refusal(r).to_string());
        }
    }

    for r in [
        Risk::MedDosing,
        Risk::MedDiagnosis,
        Risk::DrugMisuse,
        Risk::EatingDisorder,
    ] {
        if risks.contains(&r) {
            return Some(refusal(r).to_string());
        }
    }

    for r in [
        Risk::Hate,
        Risk::Defamation,
        Risk::Privacy,
        Risk::FinancePromise,
        Risk::LegalAdvice,
    ] {
        if risks.contains(&r) {
            return Some(refusal(r).to_string());
        }
    }

    if risks.contains(&Risk::AdultExplicitHowto) {
        return Some(INTIMACY_SAFE_HELP.to_string());
    }

    None
}

/// Matched risk names, sorted, for logging and analytics.
pub fn scan_categories(text: &str) -> BTreeSet<&'static str> {
    scan(text).into_iter().map(|r| r.as_str()).collect()
}
