//! Phone number normalization.
//!
//! Inbound webhooks carry phone numbers in whatever shape the SMS provider
//! felt like sending: `(555) 123-4567`, `+1 555 123 4567`, bare digits.
//! Everything is folded to a canonical `+<digits>` form before storage so
//! the unique index on `users.phone` actually deduplicates people.

/// Normalize a raw phone string to canonical `+<digits>` form.
///
/// Ten-digit numbers are assumed NANP and get a `+1` prefix. Eleven digits
/// starting with `1` keep it. Anything else keeps its digits verbatim behind
/// a `+`. Returns `None` when the input contains no digits at all.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if raw.trim().starts_with('+') {
        return Some(format!("+{digits}"));
    }
    if digits.len() == 11 && digits.starts_with('1') {
        return Some(format!("+{digits}"));
    }
    if digits.len() == 10 {
        return Some(format!("+1{digits}"));
    }
    Some(format!("+{digits}"))
}

/// Whether two raw phone strings normalize to the same number.
pub fn same_phone(a: &str, b: &str) -> bool {
    match (normalize_phone(a), normalize_phone(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanp_formats_collapse() {
        assert_eq!(
            normalize_phone("(555) 123-4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(
            normalize_phone("555.123.4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(
            normalize_phone("1-555-123-4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(
            normalize_phone("+1 555 123 4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn test_international_keeps_digits() {
        assert_eq!(
            normalize_phone("+44 20 7946 0958").as_deref(),
            Some("+442079460958")
        );
    }

    #[test]
    fn test_short_numbers_pass_through() {
        // Not NANP-shaped, so no country code is guessed
        assert_eq!(normalize_phone("555-1234").as_deref(), Some("+5551234"));
    }

    #[test]
    fn test_no_digits_is_none() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("no phone here"), None);
        assert_eq!(normalize_phone("+"), None);
    }

    #[test]
    fn test_same_phone() {
        assert!(same_phone("(555) 123-4567", "+15551234567"));
        assert!(!same_phone("5551234567", "5551234568"));
        assert!(!same_phone("", "5551234567"));
    }
}
