//! Turning lookup rows into candidates.
//!
//! The async generator in `rxverify-runtime` performs the lookups; the
//! merging, deduplication and formulation filtering it applies live here so
//! they stay synchronous and testable.

use std::collections::BTreeMap;

use crate::patterns::formulation_markers;
use crate::types::{ApproximateHit, Candidate, ConceptHit, Provenance};

/// Candidate from an authoritative barcode resolution.
pub fn barcode_candidate(hit: ConceptHit) -> Candidate {
    Candidate {
        canonical_name: hit.name,
        identifier: hit.identifier,
        provenance: Provenance::Barcode,
        raw_score: Some(1.0),
    }
}

/// Merge exact and approximate rows into one ordered, deduplicated list.
///
/// Exact rows come first. When an identifier appears more than once the
/// higher-provenance occurrence wins and keeps the earliest position.
/// Rows with a blank name or identifier are discarded.
pub fn merge_textual(exact: Vec<ConceptHit>, approximate: Vec<ApproximateHit>) -> Vec<Candidate> {
    let incoming = exact
        .into_iter()
        .map(|hit| Candidate {
            canonical_name: hit.name,
            identifier: hit.identifier,
            provenance: Provenance::Exact,
            raw_score: None,
        })
        .chain(approximate.into_iter().map(|hit| Candidate {
            canonical_name: hit.name,
            identifier: hit.identifier,
            provenance: Provenance::Approximate,
            raw_score: hit.source_score,
        }));

    let mut merged: Vec<Candidate> = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for candidate in incoming {
        if candidate.identifier.trim().is_empty() || candidate.canonical_name.trim().is_empty() {
            continue;
        }
        match seen.get(&candidate.identifier) {
            Some(&index) => {
                if candidate.provenance.trust_rank() > merged[index].provenance.trust_rank() {
                    merged[index] = candidate;
                }
            }
            None => {
                seen.insert(candidate.identifier.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }

    merged
}

/// Whether a concept carries a formulation marker the label text lacks.
pub fn formulation_mismatch(canonical_name: &str, context_text: &str) -> bool {
    let on_label = formulation_markers(context_text);
    formulation_markers(canonical_name)
        .into_iter()
        .any(|marker| !on_label.contains(&marker))
}

/// Split candidates into those consistent with the label's formulation and those dropped.
///
/// Without label text nothing is dropped. Barcode candidates are never dropped.
pub fn filter_formulation(
    candidates: Vec<Candidate>,
    context_text: Option<&str>,
) -> (Vec<Candidate>, Vec<Candidate>) {
    let Some(context) = context_text else {
        return (candidates, Vec::new());
    };
    candidates.into_iter().partition(|c| {
        c.provenance == Provenance::Barcode || !formulation_mismatch(&c.canonical_name, context)
    })
}
