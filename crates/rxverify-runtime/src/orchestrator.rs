//! Resolution orchestrator: drives one image's evidence through the state
//! machine to exactly one [`VerificationResult`].
//!
//! ```text
//! START -> BARCODE_CHECK -> RESOLVED_BARCODE
//!                        \-> TEXT_LOOKUP -> UNRESOLVED
//!                                        \-> SCORING -> UNRESOLVED
//!                                                    |-> RESOLVED_DIRECT
//!                                                    \-> AMBIGUOUS -> ARBITRATION -> RESOLVED_FINAL
//!                                                                                 \-> RESOLVED_DIRECT (deferral)
//! ```
//!
//! Every run records BARCODE_CHECK and TEXT_LOOKUP, including runs with no
//! barcode or no usable evidence. Guards are the pure functions of
//! `rxverify-core`; this module only sequences collaborators, bounds them
//! in time and records what degraded. Nothing is carried between runs.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use rxverify_core::{
    assess, ArbitrationRequest, Assessment, EvidenceDocument, EvidenceNormalizer, EvidenceRecord,
    FuzzyScorer, ResolutionConfig, ResolutionIssue, ResolutionPath, ResolutionState,
    ResolutionTrace, ScoredCandidate, VerificationResult,
};

use crate::arbitration::{ArbitrationError, Arbitrator, NoArbitration};
use crate::config::RuntimeConfig;
use crate::generator::CandidateGenerator;
use crate::lookup::{CachedLookupClient, LookupClient};
use crate::RuntimeError;

/// Result of one resolution run with its audit trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub result: VerificationResult,
    pub trace: ResolutionTrace,
}

impl ResolutionOutcome {
    pub fn path(&self) -> ResolutionPath {
        self.result.resolution_path()
    }
}

/// Sequences normalization, candidate generation, scoring and arbitration.
///
/// Never fails during resolution: every degraded collaborator becomes a
/// [`ResolutionIssue`] in the trace.
pub struct ResolutionOrchestrator {
    resolution: ResolutionConfig,
    runtime: RuntimeConfig,
    normalizer: EvidenceNormalizer,
    generator: CandidateGenerator,
    scorer: FuzzyScorer,
    arbitrator: Arc<dyn Arbitrator>,
}

impl ResolutionOrchestrator {
    pub fn builder() -> ResolutionOrchestratorBuilder {
        ResolutionOrchestratorBuilder::new()
    }

    pub fn normalizer(&self) -> &EvidenceNormalizer {
        &self.normalizer
    }

    pub fn resolution_config(&self) -> &ResolutionConfig {
        &self.resolution
    }

    /// Resolve normalized evidence.
    pub async fn resolve(&self, evidence: &EvidenceRecord) -> ResolutionOutcome {
        let mut trace = ResolutionTrace::new();
        let result = self.run(evidence, &mut trace).await;

        tracing::debug!(
            path = %result.resolution_path(),
            identifier = ?result.identifier(),
            score = result.match_score(),
            issues = trace.issues().len(),
            "Resolution finished"
        );
        ResolutionOutcome { result, trace }
    }

    /// Normalize an upstream document and resolve it.
    pub async fn resolve_document(&self, document: &EvidenceDocument) -> ResolutionOutcome {
        let evidence = self.normalizer.normalize_document(document);
        self.resolve(&evidence).await
    }

    /// Resolve documents concurrently, returning outcomes in input order.
    pub async fn resolve_batch(&self, documents: &[EvidenceDocument]) -> Vec<ResolutionOutcome> {
        stream::iter(documents)
            .map(|document| self.resolve_document(document))
            .buffered(self.runtime.batch_concurrency.max(1))
            .collect()
            .await
    }

    async fn run(&self, evidence: &EvidenceRecord, trace: &mut ResolutionTrace) -> VerificationResult {
        trace.enter(ResolutionState::BarcodeCheck);
        if let Some(candidate) = self.generator.barcode(evidence, trace).await {
            trace.enter(ResolutionState::ResolvedBarcode);
            return VerificationResult::barcode_override(&candidate);
        }

        trace.enter(ResolutionState::TextLookup);
        if !evidence.is_actionable() {
            trace.note(ResolutionIssue::EvidenceInsufficient);
            trace.enter(ResolutionState::Unresolved);
            return VerificationResult::unresolved();
        }

        let candidates = self.generator.textual(evidence, trace).await;
        if candidates.is_empty() {
            trace.enter(ResolutionState::Unresolved);
            return VerificationResult::unresolved();
        }

        trace.enter(ResolutionState::Scoring);
        let scored = self.scorer.score(evidence, &candidates);

        match assess(&scored, &self.resolution) {
            Assessment::NoAcceptable { best_similarity } => {
                trace.note(ResolutionIssue::NoAcceptableCandidate { best_similarity });
                trace.enter(ResolutionState::Unresolved);
                VerificationResult::unresolved()
            }
            Assessment::Direct(winner) => {
                trace.enter(ResolutionState::ResolvedDirect);
                VerificationResult::direct(&winner)
            }
            Assessment::Ambiguous { leader, runner_up } => {
                trace.enter(ResolutionState::Ambiguous);
                self.arbitrate(evidence, &leader, &runner_up, trace).await
            }
        }
    }

    async fn arbitrate(
        &self,
        evidence: &EvidenceRecord,
        leader: &ScoredCandidate,
        runner_up: &ScoredCandidate,
        trace: &mut ResolutionTrace,
    ) -> VerificationResult {
        trace.enter(ResolutionState::Arbitration);
        let request = ArbitrationRequest::new(evidence, leader, runner_up);
        let timeout = self.runtime.arbitration_timeout;

        let outcome = tokio::time::timeout(timeout, self.arbitrator.arbitrate(&request))
            .await
            .unwrap_or(Err(ArbitrationError::Timeout(timeout)));

        let issue = match outcome {
            Ok(Some(verdict)) if !verdict.is_justified() => ResolutionIssue::ArbitrationRejected {
                reason: format!("verdict for '{}' has no justification", verdict.selected_identifier),
            },
            Ok(Some(verdict)) => {
                let selected = [leader, runner_up]
                    .into_iter()
                    .find(|c| c.identifier() == verdict.selected_identifier);
                match selected {
                    Some(winner) => {
                        trace.enter(ResolutionState::ResolvedFinal);
                        return VerificationResult::arbitrated(winner, verdict.justification);
                    }
                    None => ResolutionIssue::ArbitrationRejected {
                        reason: format!(
                            "selected '{}', which was not one of the two candidates",
                            verdict.selected_identifier
                        ),
                    },
                }
            }
            Ok(None) => ResolutionIssue::ArbitrationUnavailable {
                reason: format!("{} deferred", self.arbitrator.name()),
            },
            Err(ArbitrationError::Verdict(e)) => ResolutionIssue::ArbitrationRejected {
                reason: e.to_string(),
            },
            Err(e) => ResolutionIssue::ArbitrationUnavailable {
                reason: e.to_string(),
            },
        };

        tracing::warn!(
            arbitrator = %self.arbitrator.name(),
            issue = %issue,
            leader = %leader.identifier(),
            "Arbitration deferred to top candidate"
        );
        trace.note(issue);
        trace.enter(ResolutionState::ResolvedDirect);
        VerificationResult::direct(leader)
    }
}

/// Builder for [`ResolutionOrchestrator`].
pub struct ResolutionOrchestratorBuilder {
    lookup: Option<Arc<dyn LookupClient>>,
    arbitrator: Option<Arc<dyn Arbitrator>>,
    resolution: ResolutionConfig,
    runtime: RuntimeConfig,
}

impl ResolutionOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            lookup: None,
            arbitrator: None,
            resolution: ResolutionConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }

    /// Set the nomenclature lookup client (required).
    pub fn lookup(mut self, client: Arc<dyn LookupClient>) -> Self {
        self.lookup = Some(client);
        self
    }

    /// Set the arbitrator. Defaults to [`NoArbitration`].
    pub fn arbitrator(mut self, arbitrator: Arc<dyn Arbitrator>) -> Self {
        self.arbitrator = Some(arbitrator);
        self
    }

    pub fn resolution_config(mut self, config: ResolutionConfig) -> Self {
        self.resolution = config;
        self
    }

    pub fn runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime = config;
        self
    }

    /// Validate configuration and build the orchestrator.
    pub fn build(self) -> Result<ResolutionOrchestrator, RuntimeError> {
        let lookup = self
            .lookup
            .ok_or_else(|| RuntimeError::NotConfigured("No lookup client set".to_string()))?;

        self.resolution.validate()?;
        self.runtime.validate()?;

        let lookup: Arc<dyn LookupClient> = if self.runtime.cache.enabled {
            Arc::new(CachedLookupClient::new(
                lookup,
                self.runtime.cache.max_entries,
                self.runtime.cache.ttl,
            ))
        } else {
            lookup
        };

        let generator =
            CandidateGenerator::new(lookup, &self.runtime, self.resolution.formulation_filter);

        Ok(ResolutionOrchestrator {
            normalizer: EvidenceNormalizer::from_config(&self.resolution),
            generator,
            scorer: FuzzyScorer::new(),
            arbitrator: self.arbitrator.unwrap_or_else(|| Arc::new(NoArbitration)),
            resolution: self.resolution,
            runtime: self.runtime,
        })
    }
}

impl Default for ResolutionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
