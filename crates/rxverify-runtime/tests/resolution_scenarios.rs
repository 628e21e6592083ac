//! End-to-end resolution scenarios against fixture lookups and scripted arbitrators.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use rxverify_core::{
    ApproximateHit, ArbitrationRequest, ArbitrationVerdict, ConceptHit, EvidenceDocument,
    LookupTier, ResolutionIssue, ResolutionPath, ResolutionState,
};
use rxverify_runtime::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use rxverify_runtime::{
    ArbitrationError, Arbitrator, LlmArbitrator, LookupClient, LookupFailure,
    ResolutionOrchestrator, RuntimeConfig, StaticLookupClient,
};

/// Arbitrator answering with a fixed verdict after a fixed delay.
struct ScriptedArbitrator {
    selected: Option<&'static str>,
    delay: Duration,
}

#[async_trait]
impl Arbitrator for ScriptedArbitrator {
    async fn arbitrate(
        &self,
        _request: &ArbitrationRequest,
    ) -> Result<Option<ArbitrationVerdict>, ArbitrationError> {
        tokio::time::sleep(self.delay).await;
        Ok(self
            .selected
            .map(|id| ArbitrationVerdict::new(id, "strength printed on label")))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Model backend that always sends the same reply.
struct CannedProvider {
    reply: &'static str,
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            content: self.reply.to_string(),
            usage: TokenUsage {
                prompt_tokens: 300,
                completion_tokens: 30,
                cache_read_tokens: 0,
            },
            model: config.model.clone(),
            stop_reason: Some("end_turn".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// Lookup whose exact tier is down for "Bad" and knows only metformin.
struct TermClient;

#[async_trait]
impl LookupClient for TermClient {
    async fn exact_query(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure> {
        if term.eq_ignore_ascii_case("bad") {
            return Err(LookupFailure::Unavailable("HTTP 503".to_string()));
        }
        if term.eq_ignore_ascii_case("metformin") {
            return Ok(vec![ConceptHit::new("metformin", "6809")]);
        }
        Ok(Vec::new())
    }

    async fn approximate_query(&self, _term: &str) -> Result<Vec<ApproximateHit>, LookupFailure> {
        Ok(Vec::new())
    }

    async fn resolve_identifier(&self, _code: &str) -> Result<Option<ConceptHit>, LookupFailure> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "term"
    }
}

fn document(value: serde_json::Value) -> EvidenceDocument {
    serde_json::from_value(value).unwrap()
}

fn named(name: &str) -> EvidenceDocument {
    document(json!({
        "extracted_entities": { "drug_name": { "value": name, "confidence": 0.8 } }
    }))
}

fn orchestrator(
    lookup: Arc<StaticLookupClient>,
    arbitrator: Option<Arc<dyn Arbitrator>>,
) -> ResolutionOrchestrator {
    let mut builder = ResolutionOrchestrator::builder().lookup(lookup);
    if let Some(arbitrator) = arbitrator {
        builder = builder.arbitrator(arbitrator);
    }
    builder.build().unwrap()
}

fn orchestrator_over(lookup: Arc<dyn LookupClient>) -> ResolutionOrchestrator {
    ResolutionOrchestrator::builder().lookup(lookup).build().unwrap()
}

fn tylenol_pair() -> Arc<StaticLookupClient> {
    Arc::new(StaticLookupClient::new().with_exact(
        "Tylenol",
        vec![
            ConceptHit::new("Tylenol 325 MG Oral Tablet", "209387"),
            ConceptHit::new("Tylenol 500 MG Oral Tablet", "209459"),
        ],
    ))
}

#[tokio::test]
async fn resolving_barcode_overrides_text() {
    let lookup = Arc::new(
        StaticLookupClient::new()
            .with_barcode(
                "0363600231",
                ConceptHit::new("diltiazem hydrochloride 30 MG Oral Tablet", "833219"),
            )
            .with_exact("Tylenol", vec![ConceptHit::new("Tylenol", "202433")]),
    );
    let orchestrator = orchestrator(lookup.clone(), None);

    let outcome = orchestrator
        .resolve_document(&document(json!({
            "extracted_entities": { "drug_name": { "value": "Tylenol", "confidence": 0.9 } },
            "barcode": { "value": "0363600231", "symbology": "UPC-A" }
        })))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::BarcodeOverride);
    assert_eq!(outcome.result.identifier(), Some("833219"));
    assert_eq!(outcome.result.match_score(), 1.0);
    assert_eq!(
        outcome.result.canonical_name(),
        Some("diltiazem hydrochloride 30 MG Oral Tablet")
    );
    assert_eq!(
        outcome.trace.states(),
        &[
            ResolutionState::Start,
            ResolutionState::BarcodeCheck,
            ResolutionState::ResolvedBarcode,
        ]
    );
    assert_eq!(lookup.calls(LookupTier::Exact), 0);
    assert_eq!(lookup.calls(LookupTier::Approximate), 0);
}

#[tokio::test]
async fn ocr_typo_resolves_through_approximate_tier() {
    let lookup = Arc::new(StaticLookupClient::new().with_approximate(
        "Lisinopri1",
        vec![ApproximateHit::new("Lisinopril 10 MG Oral Tablet", "197884", Some(92.0))],
    ));
    let outcome = orchestrator(lookup, None)
        .resolve_document(&named("Lisinopri1"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Approximate);
    assert_eq!(outcome.result.identifier(), Some("197884"));
    assert!((outcome.result.match_score() - 0.92).abs() < 1e-9);
}

#[tokio::test]
async fn no_evidence_is_unresolved() {
    let lookup = Arc::new(StaticLookupClient::new());
    let outcome = orchestrator(lookup.clone(), None)
        .resolve_document(&document(json!({ "extracted_entities": {} })))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Unresolved);
    assert_eq!(outcome.result.identifier(), None);
    assert_eq!(outcome.result.enrichment_key(), None);
    assert_eq!(outcome.result.match_score(), 0.0);
    assert_eq!(
        outcome.trace.states(),
        &[
            ResolutionState::Start,
            ResolutionState::BarcodeCheck,
            ResolutionState::TextLookup,
            ResolutionState::Unresolved,
        ]
    );
    assert_eq!(outcome.trace.issues(), &[ResolutionIssue::EvidenceInsufficient]);
    assert_eq!(lookup.calls(LookupTier::Exact), 0);
}

#[tokio::test]
async fn identical_evidence_gives_identical_outcomes() {
    let orchestrator = orchestrator(tylenol_pair(), None);
    let doc = named("Tylenol");

    let first = orchestrator.resolve_document(&doc).await;
    let second = orchestrator.resolve_document(&doc).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn near_tie_is_settled_by_arbitration() {
    let arbitrator = Arc::new(ScriptedArbitrator {
        selected: Some("209459"),
        delay: Duration::ZERO,
    });
    let outcome = orchestrator(tylenol_pair(), Some(arbitrator))
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Arbitrated);
    assert_eq!(outcome.result.identifier(), Some("209459"));
    assert_eq!(outcome.result.match_score(), 1.0);
    assert_eq!(outcome.result.justification(), Some("strength printed on label"));
    assert_eq!(
        &outcome.trace.states()[3..],
        &[
            ResolutionState::Scoring,
            ResolutionState::Ambiguous,
            ResolutionState::Arbitration,
            ResolutionState::ResolvedFinal,
        ]
    );
}

#[tokio::test]
async fn verdict_outside_the_pair_defers_to_leader() {
    let arbitrator = Arc::new(ScriptedArbitrator {
        selected: Some("161"),
        delay: Duration::ZERO,
    });
    let outcome = orchestrator(tylenol_pair(), Some(arbitrator))
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Exact);
    assert_eq!(outcome.result.identifier(), Some("209387"));
    assert_eq!(outcome.result.justification(), None);
    assert_eq!(outcome.trace.current(), ResolutionState::ResolvedDirect);
    assert!(matches!(
        outcome.trace.issues(),
        [ResolutionIssue::ArbitrationRejected { .. }]
    ));
}

#[tokio::test]
async fn verdict_without_reason_defers_to_leader() {
    let provider = Arc::new(CannedProvider {
        reply: r#"{"identifier": "209459", "name": "Tylenol 500 MG Oral Tablet"}"#,
    });
    let arbitrator = Arc::new(LlmArbitrator::from_config(provider, &RuntimeConfig::default()));
    let outcome = orchestrator(tylenol_pair(), Some(arbitrator))
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Exact);
    assert_eq!(outcome.result.identifier(), Some("209387"));
    assert_eq!(outcome.result.justification(), None);
    assert!(matches!(
        outcome.trace.issues(),
        [ResolutionIssue::ArbitrationRejected { .. }]
    ));
}

#[tokio::test]
async fn blank_justification_from_any_arbitrator_defers() {
    struct Terse;

    #[async_trait]
    impl Arbitrator for Terse {
        async fn arbitrate(
            &self,
            _request: &ArbitrationRequest,
        ) -> Result<Option<ArbitrationVerdict>, ArbitrationError> {
            Ok(Some(ArbitrationVerdict::new("209459", " ")))
        }

        fn name(&self) -> &str {
            "terse"
        }
    }

    let outcome = orchestrator(tylenol_pair(), Some(Arc::new(Terse)))
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Exact);
    assert_eq!(outcome.result.identifier(), Some("209387"));
    assert!(matches!(
        outcome.trace.issues(),
        [ResolutionIssue::ArbitrationRejected { .. }]
    ));
}

#[tokio::test]
async fn disabled_arbitration_defers_to_leader() {
    let outcome = orchestrator(tylenol_pair(), None)
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.result.identifier(), Some("209387"));
    assert!(matches!(
        outcome.trace.issues(),
        [ResolutionIssue::ArbitrationUnavailable { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn arbitration_timeout_defers_to_leader() {
    let arbitrator = Arc::new(ScriptedArbitrator {
        selected: Some("209459"),
        delay: Duration::from_secs(60),
    });
    let outcome = orchestrator(tylenol_pair(), Some(arbitrator))
        .resolve_document(&named("Tylenol"))
        .await;

    assert_eq!(outcome.result.identifier(), Some("209387"));
    assert_eq!(outcome.path(), ResolutionPath::Exact);
    match outcome.trace.issues() {
        [ResolutionIssue::ArbitrationUnavailable { reason }] => {
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("unexpected issues {other:?}"),
    }
}

#[tokio::test]
async fn exact_tier_outage_still_resolves_approximately() {
    let lookup = Arc::new(
        StaticLookupClient::new()
            .with_failure(LookupTier::Exact, LookupFailure::Unavailable("HTTP 503".into()))
            .with_approximate(
                "Lisinopri1",
                vec![ApproximateHit::new("Lisinopril 10 MG Oral Tablet", "197884", Some(92.0))],
            ),
    );
    let outcome = orchestrator(lookup, None)
        .resolve_document(&named("Lisinopri1"))
        .await;

    assert_eq!(outcome.path(), ResolutionPath::Approximate);
    assert_eq!(outcome.result.identifier(), Some("197884"));
    assert!(matches!(
        outcome.trace.issues(),
        [ResolutionIssue::LookupUnavailable { tier: LookupTier::Exact, .. }]
    ));
}

#[tokio::test]
async fn earlier_lookup_outages_do_not_change_later_results() {
    let shared = orchestrator_over(Arc::new(TermClient));
    for _ in 0..3 {
        let outcome = shared.resolve_document(&named("Bad")).await;
        assert_eq!(outcome.path(), ResolutionPath::Unresolved);
        assert!(matches!(
            outcome.trace.issues(),
            [ResolutionIssue::LookupUnavailable { tier: LookupTier::Exact, .. }]
        ));
    }
    let after_outages = shared.resolve_document(&named("Metformin")).await;

    let fresh = orchestrator_over(Arc::new(TermClient))
        .resolve_document(&named("Metformin"))
        .await;

    assert_eq!(after_outages, fresh);
    assert_eq!(after_outages.path(), ResolutionPath::Exact);
    assert_eq!(after_outages.result.identifier(), Some("6809"));
    assert!(after_outages.trace.issues().is_empty());
}

#[tokio::test]
async fn label_formulation_filters_liquid_concept() {
    let lookup = Arc::new(StaticLookupClient::new().with_exact(
        "Amoxicillin",
        vec![
            ConceptHit::new("amoxicillin 250 MG/5ML Oral Suspension", "308182"),
            ConceptHit::new("amoxicillin 500 MG Oral Capsule", "308191"),
        ],
    ));
    let outcome = orchestrator(lookup, None)
        .resolve_document(&document(json!({
            "extracted_entities": { "drug_name": { "value": "Amoxicillin", "confidence": 0.9 } },
            "raw_ocr": { "engine": "paddleocr", "full_text": "AMOXICILLIN 500 mg\n30 capsules" }
        })))
        .await;

    assert_eq!(outcome.result.identifier(), Some("308191"));
    assert_eq!(
        outcome.trace.issues(),
        &[ResolutionIssue::FormulationFiltered {
            identifiers: vec!["308182".to_string()]
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn batch_preserves_input_order() {
    let lookup = Arc::new(
        StaticLookupClient::new()
            .with_exact("metformin", vec![ConceptHit::new("metformin", "6809")])
            .with_exact("lisinopril", vec![ConceptHit::new("lisinopril", "29046")])
            .with_exact("atorvastatin", vec![ConceptHit::new("atorvastatin", "83367")])
            .with_latency(LookupTier::Exact, Duration::from_millis(250)),
    );
    let orchestrator = ResolutionOrchestrator::builder()
        .lookup(lookup)
        .runtime_config(RuntimeConfig {
            batch_concurrency: 2,
            ..Default::default()
        })
        .build()
        .unwrap();

    let documents = vec![
        named("atorvastatin"),
        named("metformin"),
        named("nothing-known"),
        named("lisinopril"),
    ];
    let outcomes = orchestrator.resolve_batch(&documents).await;

    let identifiers: Vec<Option<&str>> = outcomes.iter().map(|o| o.result.identifier()).collect();
    assert_eq!(
        identifiers,
        vec![Some("83367"), Some("6809"), None, Some("29046")]
    );
}
