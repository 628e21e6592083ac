//! Candidate generation against the nomenclature service.
//!
//! Every lookup is bounded by a timeout. A failed tier contributes no
//! candidates and leaves an issue in the trace; it never aborts the run.
//! The generator keeps no state between runs, so one image's lookup
//! failures never change how another image is resolved. Retry and circuit
//! breaking belong to the [`LookupClient`] implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rxverify_core::{
    barcode_candidate, filter_formulation, merge_textual, Candidate, EvidenceRecord, LookupTier,
    ResolutionIssue, ResolutionTrace,
};

use crate::config::RuntimeConfig;
use crate::lookup::{LookupClient, LookupFailure};

/// Produces candidates from evidence.
pub struct CandidateGenerator {
    client: Arc<dyn LookupClient>,
    lookup_timeout: Duration,
    barcode_timeout: Duration,
    formulation_filter: bool,
}

impl CandidateGenerator {
    pub fn new(
        client: Arc<dyn LookupClient>,
        config: &RuntimeConfig,
        formulation_filter: bool,
    ) -> Self {
        Self {
            client,
            lookup_timeout: config.lookup_timeout,
            barcode_timeout: config.barcode_timeout,
            formulation_filter,
        }
    }

    /// Full generation contract: the barcode candidate alone when the
    /// barcode resolves, otherwise the merged textual candidates.
    pub async fn generate(
        &self,
        evidence: &EvidenceRecord,
        trace: &mut ResolutionTrace,
    ) -> Vec<Candidate> {
        if let Some(candidate) = self.barcode(evidence, trace).await {
            return vec![candidate];
        }
        self.textual(evidence, trace).await
    }

    /// Authoritative candidate for the evidence's barcode, if it resolves.
    pub async fn barcode(
        &self,
        evidence: &EvidenceRecord,
        trace: &mut ResolutionTrace,
    ) -> Option<Candidate> {
        let code = evidence.barcode()?;

        let outcome = self
            .bounded(self.barcode_timeout, self.client.resolve_identifier(code))
            .await;

        match outcome {
            Ok(Some(hit)) => {
                tracing::debug!(barcode = %code, identifier = %hit.identifier, "Barcode resolved");
                Some(barcode_candidate(hit))
            }
            Ok(None) | Err(LookupFailure::NotFound) => {
                tracing::debug!(barcode = %code, "Barcode does not denote a known concept");
                None
            }
            Err(failure) => {
                note_degraded(trace, LookupTier::Barcode, &failure);
                None
            }
        }
    }

    /// Exact and approximate candidates for the drug-name guess.
    ///
    /// Both tiers are queried concurrently and both are awaited; a failure in
    /// one never cancels the other.
    pub async fn textual(
        &self,
        evidence: &EvidenceRecord,
        trace: &mut ResolutionTrace,
    ) -> Vec<Candidate> {
        let Some(term) = evidence.lookup_term() else {
            return Vec::new();
        };

        let (exact, approximate) = tokio::join!(
            self.bounded(self.lookup_timeout, self.client.exact_query(term)),
            self.bounded(self.lookup_timeout, self.client.approximate_query(term)),
        );

        let exact = settle(trace, LookupTier::Exact, exact);
        let approximate = settle(trace, LookupTier::Approximate, approximate);
        let merged = merge_textual(exact, approximate);

        if !self.formulation_filter {
            return merged;
        }

        let (kept, dropped) = filter_formulation(merged, evidence.context_text());
        if !dropped.is_empty() {
            let identifiers: Vec<String> = dropped.into_iter().map(|c| c.identifier).collect();
            tracing::debug!(dropped = ?identifiers, "Formulation filter applied");
            trace.note(ResolutionIssue::FormulationFiltered { identifiers });
        }
        kept
    }

    async fn bounded<T, F>(&self, timeout: Duration, call: F) -> Result<T, LookupFailure>
    where
        F: Future<Output = Result<T, LookupFailure>>,
    {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LookupFailure::Timeout(timeout)),
        }
    }
}

fn note_degraded(trace: &mut ResolutionTrace, tier: LookupTier, failure: &LookupFailure) {
    tracing::warn!(tier = %tier, error = %failure, "Lookup tier degraded");
    trace.note(ResolutionIssue::LookupUnavailable {
        tier,
        reason: failure.to_string(),
    });
}

/// Rows from a tier, or none when it failed.
fn settle<T>(
    trace: &mut ResolutionTrace,
    tier: LookupTier,
    outcome: Result<Vec<T>, LookupFailure>,
) -> Vec<T> {
    match outcome {
        Ok(rows) => rows,
        Err(LookupFailure::NotFound) => Vec::new(),
        Err(failure) => {
            note_degraded(trace, tier, &failure);
            Vec::new()
        }
    }
}
