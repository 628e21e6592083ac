//! LLM-backed arbitration.

use async_trait::async_trait;
use std::sync::Arc;

use rxverify_core::{parse_verdict, ArbitrationRequest, ArbitrationVerdict};

use super::{ArbitrationError, Arbitrator};
use crate::config::RuntimeConfig;
use crate::prompts::arbitration_messages;
use crate::providers::{CompletionConfig, LlmProvider};
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage, Service};

/// Arbitrates by asking an LLM provider to pick one of the two candidates.
///
/// The reply must contain a JSON verdict that passes the verdict schema and
/// names one of the presented candidates. When the circuit is open or the
/// token budget cannot cover the call, the provider is not contacted.
pub struct LlmArbitrator {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    circuit_breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetTracker>,
}

impl LlmArbitrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        circuit_breaker: Arc<CircuitBreaker>,
        budget: Arc<BudgetTracker>,
    ) -> Self {
        Self {
            provider,
            completion,
            circuit_breaker,
            budget,
        }
    }

    /// Arbitrator with its own breaker and budget, sized from `config`.
    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        Self::new(
            provider,
            CompletionConfig::for_arbitration(&config.arbitration, config.arbitration_timeout),
            Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            Arc::new(BudgetTracker::new(config.arbitration.token_budget)),
        )
    }

    /// Token usage so far.
    pub fn usage(&self) -> LlmUsage {
        self.budget.usage()
    }
}

#[async_trait]
impl Arbitrator for LlmArbitrator {
    async fn arbitrate(
        &self,
        request: &ArbitrationRequest,
    ) -> Result<Option<ArbitrationVerdict>, ArbitrationError> {
        if self.circuit_breaker.is_open(Service::Arbitration) {
            tracing::warn!(provider = %self.provider.name(), "Arbitration circuit open, deferring");
            return Err(ArbitrationError::CircuitOpen);
        }

        let messages = arbitration_messages(request);
        let prompt_tokens: u32 = messages
            .iter()
            .map(|m| self.provider.estimate_tokens(&m.content))
            .sum();
        if !self
            .budget
            .can_afford(prompt_tokens + self.completion.max_tokens)
        {
            tracing::warn!(remaining = self.budget.remaining(), "Arbitration budget exhausted, deferring");
            return Err(ArbitrationError::BudgetExhausted);
        }

        let response = match self.provider.complete(messages, &self.completion).await {
            Ok(response) => {
                self.circuit_breaker.record_success(Service::Arbitration);
                response
            }
            Err(e) => {
                self.circuit_breaker.record_failure(Service::Arbitration);
                return Err(e.into());
            }
        };
        self.budget.record_usage(&response.usage, &response.model);

        let verdict = parse_verdict(&response.content, request)?;
        tracing::debug!(
            selected = %verdict.selected_identifier,
            tokens = response.usage.total(),
            "Arbitration verdict accepted"
        );
        Ok(Some(verdict))
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionResponse, ProviderError, TokenUsage};
    use crate::resilience::CircuitBreakerConfig;
    use parking_lot::Mutex;
    use rxverify_core::{
        Candidate, EvidenceNormalizer, Provenance, RawEntities, RawEntity, ScoredCandidate,
        VerdictError,
    };

    /// Provider returning scripted replies in order.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            *self.calls.lock() += 1;
            let reply = self.replies.lock().remove(0)?;
            Ok(CompletionResponse {
                content: reply,
                usage: TokenUsage {
                    prompt_tokens: 400,
                    completion_tokens: 40,
                    cache_read_tokens: 0,
                },
                model: "scripted".to_string(),
                stop_reason: Some("end_turn".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn scored(name: &str, id: &str, similarity: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                canonical_name: name.to_string(),
                identifier: id.to_string(),
                provenance: Provenance::Exact,
                raw_score: None,
            },
            similarity,
            position: 0,
        }
    }

    fn request() -> ArbitrationRequest {
        let raw = RawEntities {
            drug_name: Some(RawEntity::text("Hydrocodone APAP", 0.8)),
            ..Default::default()
        };
        let evidence = EvidenceNormalizer::default().normalize(&raw, None);
        ArbitrationRequest::new(
            &evidence,
            &scored("Hydrocodone / Acetaminophen Oral Tablet", "857002", 0.90),
            &scored("Hydrocodone / Ibuprofen Oral Tablet", "859315", 0.84),
        )
    }

    fn arbitrator(provider: Arc<ScriptedProvider>, budget: u32) -> LlmArbitrator {
        LlmArbitrator::new(
            provider,
            CompletionConfig::default(),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            Arc::new(BudgetTracker::new(budget)),
        )
    }

    #[tokio::test]
    async fn test_fenced_verdict_is_accepted() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            "```json\n{\"identifier\": \"859315\", \"name\": \"Hydrocodone / Ibuprofen Oral Tablet\", \"reason\": \"label lists ibuprofen\"}\n```".to_string(),
        )]));
        let arbitrator = arbitrator(provider.clone(), 50_000);

        let verdict = arbitrator.arbitrate(&request()).await.unwrap().unwrap();
        assert_eq!(verdict.selected_identifier, "859315");
        assert_eq!(verdict.justification, "label lists ibuprofen");
        assert_eq!(arbitrator.usage().calls, 1);
        assert_eq!(arbitrator.usage().total_tokens, 440);
    }

    #[tokio::test]
    async fn test_third_candidate_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"identifier": "161", "name": "Acetaminophen", "reason": "single ingredient"}"#.to_string(),
        )]));
        let outcome = arbitrator(provider, 50_000).arbitrate(&request()).await;
        assert!(matches!(
            outcome,
            Err(ArbitrationError::Verdict(VerdictError::UnknownCandidate(_)))
        ));
    }

    #[tokio::test]
    async fn test_unjustified_verdict_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"identifier": "859315", "reason": "   "}"#.to_string(),
        )]));
        let outcome = arbitrator(provider, 50_000).arbitrate(&request()).await;
        assert!(matches!(
            outcome,
            Err(ArbitrationError::Verdict(VerdictError::Schema(_)))
        ));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let outcome = arbitrator(provider.clone(), 10).arbitrate(&request()).await;
        assert!(matches!(outcome, Err(ArbitrationError::BudgetExhausted)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_provider_failures_open_circuit() {
        let provider = Arc::new(ScriptedProvider::new(
            (0..3)
                .map(|_| Err(ProviderError::HttpError("connection reset".to_string())))
                .collect(),
        ));
        let arbitrator = arbitrator(provider.clone(), 50_000);

        for _ in 0..3 {
            assert!(matches!(
                arbitrator.arbitrate(&request()).await,
                Err(ArbitrationError::Provider(_))
            ));
        }
        assert!(matches!(
            arbitrator.arbitrate(&request()).await,
            Err(ArbitrationError::CircuitOpen)
        ));
        assert_eq!(provider.calls(), 3);
    }
}
