//! Shared data model: candidates, scores and the terminal verification result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Evidence tier that produced a candidate.
///
/// Doubles as a trust ranking: a barcode-resolved identifier dominates
/// anything derived from text, and an exact nomenclature hit beats an
/// approximate one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Barcode,
    Exact,
    Approximate,
}

impl Provenance {
    /// Trust rank; higher wins.
    pub fn trust_rank(self) -> u8 {
        match self {
            Provenance::Barcode => 3,
            Provenance::Exact => 2,
            Provenance::Approximate => 1,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Barcode => write!(f, "barcode"),
            Provenance::Exact => write!(f, "exact"),
            Provenance::Approximate => write!(f, "approximate"),
        }
    }
}

/// How the final identity was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionPath {
    BarcodeOverride,
    Exact,
    Approximate,
    Arbitrated,
    Unresolved,
}

impl ResolutionPath {
    pub fn is_resolved(self) -> bool {
        !matches!(self, ResolutionPath::Unresolved)
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionPath::BarcodeOverride => "BARCODE_OVERRIDE",
            ResolutionPath::Exact => "EXACT",
            ResolutionPath::Approximate => "APPROXIMATE",
            ResolutionPath::Arbitrated => "ARBITRATED",
            ResolutionPath::Unresolved => "UNRESOLVED",
        };
        f.write_str(label)
    }
}

/// A concept row returned by the nomenclature service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptHit {
    /// Canonical concept name
    pub name: String,

    /// Concept identifier (RxNorm CUI)
    pub identifier: String,
}

impl ConceptHit {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

/// A ranked row from the service's approximate matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproximateHit {
    pub name: String,
    pub identifier: String,

    /// The service's own similarity score, if it reported one
    #[serde(default)]
    pub source_score: Option<f64>,
}

impl ApproximateHit {
    pub fn new(
        name: impl Into<String>,
        identifier: impl Into<String>,
        source_score: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            source_score,
        }
    }
}

/// A named drug concept proposed by the candidate generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub canonical_name: String,
    pub identifier: String,
    pub provenance: Provenance,
    pub raw_score: Option<f64>,
}

/// A textual candidate with its similarity to the evidence term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,

    /// Similarity in [0, 1]
    pub similarity: f64,

    /// Position in generator output, used as the final tie-breaker
    pub position: usize,
}

impl ScoredCandidate {
    pub fn identifier(&self) -> &str {
        &self.candidate.identifier
    }

    pub fn canonical_name(&self) -> &str {
        &self.candidate.canonical_name
    }

    pub fn provenance(&self) -> Provenance {
        self.candidate.provenance
    }

    /// The path a direct (non-arbitrated) win by this candidate reports.
    pub fn direct_path(&self) -> ResolutionPath {
        match self.candidate.provenance {
            Provenance::Barcode => ResolutionPath::BarcodeOverride,
            Provenance::Exact => ResolutionPath::Exact,
            Provenance::Approximate => ResolutionPath::Approximate,
        }
    }
}

/// Final verdict of one resolution run.
///
/// Serializes with the field names downstream consumers already read
/// (`rxnorm_cui`, `matched_term`, `match_score`, `final_canonical_name`,
/// `justification`). The resolution path is exposed through
/// [`VerificationResult::resolution_path`] and reported separately.
///
/// Fields are private so a result cannot change after construction;
/// `identifier` is `None` exactly when the path is `Unresolved`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    #[serde(rename = "rxnorm_cui")]
    identifier: Option<String>,

    #[serde(rename = "matched_term")]
    matched_term: Option<String>,

    #[serde(rename = "match_score")]
    match_score: f64,

    #[serde(rename = "final_canonical_name")]
    canonical_name: Option<String>,

    justification: Option<String>,

    #[serde(skip)]
    resolution_path: ResolutionPath,
}

impl VerificationResult {
    /// No identity could be established.
    pub fn unresolved() -> Self {
        Self {
            identifier: None,
            matched_term: None,
            match_score: 0.0,
            canonical_name: None,
            justification: None,
            resolution_path: ResolutionPath::Unresolved,
        }
    }

    /// Barcode-resolved identity; score is pinned to 1.0.
    pub fn barcode_override(candidate: &Candidate) -> Self {
        Self {
            identifier: Some(candidate.identifier.clone()),
            matched_term: Some(candidate.canonical_name.clone()),
            match_score: 1.0,
            canonical_name: Some(candidate.canonical_name.clone()),
            justification: None,
            resolution_path: ResolutionPath::BarcodeOverride,
        }
    }

    /// Top-scoring candidate wins without arbitration.
    pub fn direct(winner: &ScoredCandidate) -> Self {
        Self::from_scored(winner, winner.direct_path(), None)
    }

    /// Winner chosen by the arbitration capability.
    pub fn arbitrated(winner: &ScoredCandidate, justification: impl Into<String>) -> Self {
        Self::from_scored(winner, ResolutionPath::Arbitrated, Some(justification.into()))
    }

    fn from_scored(
        winner: &ScoredCandidate,
        resolution_path: ResolutionPath,
        justification: Option<String>,
    ) -> Self {
        Self {
            identifier: Some(winner.candidate.identifier.clone()),
            matched_term: Some(winner.candidate.canonical_name.clone()),
            match_score: winner.similarity.clamp(0.0, 1.0),
            canonical_name: Some(winner.candidate.canonical_name.clone()),
            justification,
            resolution_path,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn matched_term(&self) -> Option<&str> {
        self.matched_term.as_deref()
    }

    pub fn match_score(&self) -> f64 {
        self.match_score
    }

    pub fn canonical_name(&self) -> Option<&str> {
        self.canonical_name.as_deref()
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn resolution_path(&self) -> ResolutionPath {
        self.resolution_path
    }

    /// Lookup key for the enrichment collaborator; `None` means skip enrichment.
    pub fn enrichment_key(&self) -> Option<&str> {
        self.identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(provenance: Provenance, similarity: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                canonical_name: "Lisinopril 10 MG Oral Tablet".to_string(),
                identifier: "197884".to_string(),
                provenance,
                raw_score: None,
            },
            similarity,
            position: 0,
        }
    }

    #[test]
    fn test_unresolved_has_no_identity() {
        let result = VerificationResult::unresolved();
        assert!(result.identifier().is_none());
        assert!(result.canonical_name().is_none());
        assert_eq!(result.match_score(), 0.0);
        assert_eq!(result.resolution_path(), ResolutionPath::Unresolved);
        assert!(result.enrichment_key().is_none());
    }

    #[test]
    fn test_direct_path_follows_provenance() {
        assert_eq!(
            VerificationResult::direct(&scored(Provenance::Exact, 0.9)).resolution_path(),
            ResolutionPath::Exact
        );
        assert_eq!(
            VerificationResult::direct(&scored(Provenance::Approximate, 0.9)).resolution_path(),
            ResolutionPath::Approximate
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let result = VerificationResult::arbitrated(
            &scored(Provenance::Exact, 0.87),
            "single ingredient matches label",
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["rxnorm_cui"], "197884");
        assert_eq!(json["matched_term"], "Lisinopril 10 MG Oral Tablet");
        assert_eq!(json["final_canonical_name"], "Lisinopril 10 MG Oral Tablet");
        assert_eq!(json["justification"], "single ingredient matches label");
        assert!((json["match_score"].as_f64().unwrap() - 0.87).abs() < 1e-9);
        assert!(json.get("resolution_path").is_none());
    }

    #[test]
    fn test_trust_rank_ordering() {
        assert!(Provenance::Barcode.trust_rank() > Provenance::Exact.trust_rank());
        assert!(Provenance::Exact.trust_rank() > Provenance::Approximate.trust_rank());
    }
}
