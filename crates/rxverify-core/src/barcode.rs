//! Interpreting decoded barcode values as National Drug Codes.
//!
//! Package barcodes carry the NDC in several encodings (bare NDC-10 with
//! the segmentation lost, UPC-A, GS1 GTIN-14). The nomenclature service
//! indexes NDC-11, so each scan expands to every NDC-11 it could denote.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::patterns::{GS1_GTIN, NDC_HYPHENATED};

/// An 11-digit NDC in 5-4-2 layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ndc11(String);

impl Ndc11 {
    fn from_segments(labeler: &str, product: &str, package: &str) -> Option<Self> {
        if labeler.len() > 5 || product.len() > 4 || package.len() > 2 {
            return None;
        }
        Some(Self(format!("{labeler:0>5}{product:0>4}{package:0>2}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Labeler-product portion, e.g. `03636-0023`.
    pub fn product_code(&self) -> String {
        format!("{}-{}", &self.0[..5], &self.0[5..9])
    }
}

impl fmt::Display for Ndc11 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..5], &self.0[5..9], &self.0[9..])
    }
}

/// Every NDC-11 a scanned barcode value could denote, most likely first.
///
/// Returns an empty list when the value is not NDC-bearing.
pub fn ndc_candidates(value: &str) -> Vec<Ndc11> {
    let value = value.trim();

    if let Some(caps) = NDC_HYPHENATED.captures(value) {
        return Ndc11::from_segments(&caps[1], &caps[2], &caps[3])
            .into_iter()
            .collect();
    }

    if let Some(caps) = GS1_GTIN.captures(value) {
        return from_gtin14(&caps[1]);
    }

    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Vec::new();
    }

    match value.len() {
        10 => from_ndc10(value),
        11 => vec![Ndc11(value.to_string())],
        // UPC-A: number system '3', NDC-10, check digit
        12 if value.starts_with('3') => from_ndc10(&value[1..11]),
        14 => from_gtin14(value),
        _ => Vec::new(),
    }
}

/// NDC-10 of unknown segmentation: 4-4-2, 5-3-2 and 5-4-1 readings.
fn from_ndc10(digits: &str) -> Vec<Ndc11> {
    [
        (&digits[..4], &digits[4..8], &digits[8..]),
        (&digits[..5], &digits[5..8], &digits[8..]),
        (&digits[..5], &digits[5..9], &digits[9..]),
    ]
    .into_iter()
    .filter_map(|(labeler, product, package)| Ndc11::from_segments(labeler, product, package))
    .fold(Vec::new(), |mut acc, ndc| {
        if !acc.contains(&ndc) {
            acc.push(ndc);
        }
        acc
    })
}

/// GTIN-14 wrapping a UPC-A: indicator '0', '03', NDC-10, check digit.
fn from_gtin14(gtin: &str) -> Vec<Ndc11> {
    if gtin.len() == 14 && gtin.starts_with("003") {
        from_ndc10(&gtin[3..13])
    } else {
        Vec::new()
    }
}
