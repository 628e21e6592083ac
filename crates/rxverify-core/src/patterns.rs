//! Shared text patterns for normalization, scoring and barcode parsing.
//!
//! Word lists come from the label text seen on pharmacy bottles and blister
//! strips: boilerplate that is never a drug name, and formulation markers
//! that distinguish otherwise identical concepts.

use lazy_static::lazy_static;
use regex::Regex;

/// Label boilerplate that never identifies a drug on its own.
pub const STOPWORDS: &[&str] = &[
    "rx", "take", "tablet", "tablets", "capsule", "capsules", "pharmacy", "qty", "refills",
    "once", "daily", "hours", "day", "pain", "mouth", "by", "for",
];

/// Formulation markers; a concept carrying one the label lacks is a different product.
pub const FORMULATION_KEYWORDS: &[&str] = &[
    "suspension",
    "solution",
    "polistirex",
    "extended release",
    "12 hr",
    "er",
    "mg/ml",
];

lazy_static! {
    /// Runs of whitespace.
    pub static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    /// Characters that are not part of a comparable token.
    pub static ref NON_TOKEN_CHARS: Regex = Regex::new(r"[^a-z0-9/.]").unwrap();

    /// Hyphenated NDC (4-4-2, 5-3-2, 5-4-1, or already padded 5-4-2).
    /// ASCII digits only; segments are sliced by byte offset.
    pub static ref NDC_HYPHENATED: Regex =
        Regex::new(r"^([0-9]{4,5})-([0-9]{3,4})-([0-9]{1,2})$").unwrap();

    /// GS1 element string carrying a GTIN-14 under application identifier 01.
    pub static ref GS1_GTIN: Regex = Regex::new(r"(?:\(01\)|^01)([0-9]{14})").unwrap();

    /// Formulation keyword matchers, word-bounded and case-insensitive.
    pub static ref FORMULATION_MATCHERS: Vec<(&'static str, Regex)> = FORMULATION_KEYWORDS
        .iter()
        .map(|kw| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(kw));
            (*kw, Regex::new(&pattern).unwrap())
        })
        .collect();
}

/// Lowercase a token and strip characters outside `[a-z0-9/.]`.
pub fn normalize_token(token: &str) -> String {
    let lowered = token.to_lowercase();
    NON_TOKEN_CHARS
        .replace_all(&lowered, "")
        .trim_matches('.')
        .to_string()
}

/// Collapse internal whitespace and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Whether a token is label boilerplate.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Formulation keywords mentioned in `text`.
pub fn formulation_markers(text: &str) -> Vec<&'static str> {
    FORMULATION_MATCHERS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(kw, _)| *kw)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("Lisinopril,"), "lisinopril");
        assert_eq!(normalize_token("10MG"), "10mg");
        assert_eq!(normalize_token("5/325"), "5/325");
        assert_eq!(normalize_token("2.5mg."), "2.5mg");
        assert_eq!(normalize_token("(Rx)"), "rx");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Sun \t Pharma\n Ltd "), "Sun Pharma Ltd");
    }

    #[test]
    fn test_formulation_markers_are_word_bounded() {
        assert_eq!(formulation_markers("Hydrocodone ER 12 HR"), vec!["12 hr", "er"]);
        // "er" inside a word is not a marker
        assert!(formulation_markers("Lisinopril Oral Tablet, Merck").is_empty());
        assert_eq!(formulation_markers("1 MG/ML Oral Suspension"), vec!["suspension", "mg/ml"]);
    }

    #[test]
    fn test_gs1_gtin() {
        let caps = GS1_GTIN.captures("(01)00363600231017(17)250101").unwrap();
        assert_eq!(&caps[1], "00363600231017");
    }

    #[test]
    fn test_ndc_patterns_match_ascii_digits_only() {
        assert!(NDC_HYPHENATED.is_match("0363-6002-31"));
        assert!(!NDC_HYPHENATED.is_match("٠٣٦٣-٦٠٠٢-٣١"));
        assert!(!GS1_GTIN.is_match("(01)٠٠٣٦٣٦٠٠٢٣١٠١٧"));
    }
}
