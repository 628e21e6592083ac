//! Token-set fuzzy scoring.
//!
//! Similarity between the evidence drug-name string and a candidate's
//! canonical name, insensitive to token order and repetition. Tokens that
//! only partly overlap still contribute through rapidfuzz's character-level
//! indel ratio over the sorted token strings.

use rapidfuzz::fuzz;
use std::collections::BTreeSet;

use crate::evidence::EvidenceRecord;
use crate::patterns::normalize_token;
use crate::types::{Candidate, Provenance, ScoredCandidate};

/// Normalized, deduplicated tokens of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalized indel similarity over characters: `2 * lcs / (|a| + |b|)`.
/// Two empty strings are identical.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    fuzz::ratio(a.chars(), b.chars()).clamp(0.0, 1.0)
}

/// Token-set similarity in [0, 1].
///
/// With token sets A and B and intersection I, compares `sorted(I)`,
/// `sorted(I) + sorted(A-B)` and `sorted(I) + sorted(B-A)` pairwise and keeps
/// the best ratio. A shared core with nothing left over on one side is a
/// full match.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let join = |tokens: Vec<&String>| {
        tokens
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let sect = join(left.intersection(&right).collect());
    let only_left = join(left.difference(&right).collect());
    let only_right = join(right.difference(&left).collect());

    if !sect.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 1.0;
    }

    let combine = |rest: &str| {
        if sect.is_empty() {
            rest.to_string()
        } else {
            format!("{sect} {rest}")
        }
    };
    let with_left = combine(&only_left);
    let with_right = combine(&only_right);

    let mut best = indel_ratio(&with_left, &with_right);
    if !sect.is_empty() {
        best = best
            .max(indel_ratio(&sect, &with_left))
            .max(indel_ratio(&sect, &with_right));
    }
    best.clamp(0.0, 1.0)
}

/// Map a service-reported score into [0, 1]; scores above 1 are percentages.
pub fn normalize_source_score(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(scaled.min(1.0))
}

/// Scores textual candidates against the evidence drug-name guess.
#[derive(Debug, Clone, Default)]
pub struct FuzzyScorer;

impl FuzzyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Similarity of one candidate to the evidence term.
    ///
    /// Approximate candidates keep the service's own score when it is
    /// higher: the service matcher corrects OCR confusions such as `1`/`l`
    /// that token comparison cannot.
    pub fn similarity(&self, term: &str, candidate: &Candidate) -> f64 {
        let token_score = token_set_similarity(term, &candidate.canonical_name);
        match (candidate.provenance, candidate.raw_score.and_then(normalize_source_score)) {
            (Provenance::Approximate, Some(source)) => token_score.max(source),
            _ => token_score,
        }
    }

    /// Score and rank candidates.
    ///
    /// Sorted by similarity descending, then trust rank, then generator
    /// order. Barcode candidates are terminal upstream and are skipped here.
    /// Nothing is dropped for falling below a threshold; callers filter.
    pub fn score(&self, evidence: &EvidenceRecord, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let term = evidence.drug_name().map(|g| g.folded()).unwrap_or_default();

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.provenance != Provenance::Barcode)
            .map(|(position, candidate)| ScoredCandidate {
                similarity: self.similarity(term, candidate),
                candidate: candidate.clone(),
                position,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.provenance().trust_rank().cmp(&a.provenance().trust_rank()))
                .then_with(|| a.position.cmp(&b.position))
        });

        tracing::debug!(
            term = term,
            candidates = scored.len(),
            top = ?scored.first().map(|s| (s.identifier(), s.similarity)),
            "Candidates scored"
        );

        scored
    }
}
