//! Resolution state machine: states, audit trace and scoring guards.
//!
//! The runtime orchestrator drives the transitions. The decision taken after
//! scoring is the pure [`assess`] function so it can be tested without any
//! collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ResolutionConfig;
use crate::types::ScoredCandidate;

/// States of one resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Start,
    BarcodeCheck,
    ResolvedBarcode,
    TextLookup,
    Scoring,
    ResolvedDirect,
    Ambiguous,
    Arbitration,
    ResolvedFinal,
    Unresolved,
}

impl ResolutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResolutionState::ResolvedBarcode
                | ResolutionState::ResolvedDirect
                | ResolutionState::ResolvedFinal
                | ResolutionState::Unresolved
        )
    }
}

/// Lookup tier that degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupTier {
    Barcode,
    Exact,
    Approximate,
}

impl fmt::Display for LookupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupTier::Barcode => write!(f, "barcode"),
            LookupTier::Exact => write!(f, "exact"),
            LookupTier::Approximate => write!(f, "approximate"),
        }
    }
}

/// Non-fatal problems met during a run. Recorded, never returned as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionIssue {
    /// Neither a barcode nor a usable drug-name guess
    EvidenceInsufficient,

    LookupUnavailable { tier: LookupTier, reason: String },

    /// Candidates existed but none cleared the acceptance threshold
    NoAcceptableCandidate { best_similarity: Option<f64> },

    /// Textual candidates dropped for contradicting the label's formulation
    FormulationFiltered { identifiers: Vec<String> },

    ArbitrationUnavailable { reason: String },

    /// The arbitrator answered, but not with one of the two candidates
    ArbitrationRejected { reason: String },
}

impl fmt::Display for ResolutionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionIssue::EvidenceInsufficient => write!(f, "evidence insufficient"),
            ResolutionIssue::LookupUnavailable { tier, reason } => {
                write!(f, "{tier} lookup unavailable: {reason}")
            }
            ResolutionIssue::NoAcceptableCandidate { best_similarity } => match best_similarity {
                Some(best) => write!(f, "no acceptable candidate (best {best:.2})"),
                None => write!(f, "no acceptable candidate"),
            },
            ResolutionIssue::FormulationFiltered { identifiers } => {
                write!(f, "formulation filter dropped {}", identifiers.join(", "))
            }
            ResolutionIssue::ArbitrationUnavailable { reason } => {
                write!(f, "arbitration unavailable: {reason}")
            }
            ResolutionIssue::ArbitrationRejected { reason } => {
                write!(f, "arbitration verdict rejected: {reason}")
            }
        }
    }
}

/// Ordered audit of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTrace {
    states: Vec<ResolutionState>,
    issues: Vec<ResolutionIssue>,
}

impl Default for ResolutionTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionTrace {
    pub fn new() -> Self {
        Self {
            states: vec![ResolutionState::Start],
            issues: Vec::new(),
        }
    }

    pub fn enter(&mut self, state: ResolutionState) {
        tracing::trace!(state = ?state, "Resolution state entered");
        self.states.push(state);
    }

    pub fn note(&mut self, issue: ResolutionIssue) {
        self.issues.push(issue);
    }

    pub fn states(&self) -> &[ResolutionState] {
        &self.states
    }

    pub fn issues(&self) -> &[ResolutionIssue] {
        &self.issues
    }

    pub fn current(&self) -> ResolutionState {
        self.states
            .last()
            .copied()
            .unwrap_or(ResolutionState::Start)
    }

    pub fn visited(&self, state: ResolutionState) -> bool {
        self.states.contains(&state)
    }
}

/// Decision taken after scoring.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// Nothing cleared the acceptance threshold
    NoAcceptable { best_similarity: Option<f64> },

    /// Leader wins outright
    Direct(ScoredCandidate),

    /// Top two are too close; arbitration decides, leader on deferral
    Ambiguous {
        leader: ScoredCandidate,
        runner_up: ScoredCandidate,
    },
}

/// Apply the acceptance and ambiguity guards to a ranked candidate list.
///
/// `scored` must already be in scorer order (best first).
pub fn assess(scored: &[ScoredCandidate], config: &ResolutionConfig) -> Assessment {
    let mut accepted = scored
        .iter()
        .filter(|c| c.similarity >= config.acceptance_threshold);

    let Some(leader) = accepted.next() else {
        return Assessment::NoAcceptable {
            best_similarity: scored.first().map(|c| c.similarity),
        };
    };

    match accepted.next() {
        Some(runner_up) if config.is_ambiguous(leader.similarity, runner_up.similarity) => {
            Assessment::Ambiguous {
                leader: leader.clone(),
                runner_up: runner_up.clone(),
            }
        }
        _ => Assessment::Direct(leader.clone()),
    }
}
