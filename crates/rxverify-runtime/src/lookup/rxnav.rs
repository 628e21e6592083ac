//! RxNav REST client.
//!
//! - exact: `/drugs.json?name=` flattened over concept groups
//! - approximate: `/approximateTerm.json?term=&maxEntries=`, with names
//!   missing from the response filled in through `/rxcui/{id}/properties.json`
//! - barcode: each NDC-11 reading of the value against `/ndcstatus.json?ndc=`
//!
//! Transient failures (timeouts, 5xx, 429) are retried with exponential
//! backoff. Everything else surfaces immediately. Each endpoint sits behind
//! its own circuit: once it keeps failing the client answers `Unavailable`
//! without calling RxNav until the recovery timeout has passed. A missing
//! name for one approximate row drops that row, not the tier.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rxverify_core::{ndc_candidates, ApproximateHit, ConceptHit, LookupTier};

use super::{LookupClient, LookupFailure};
use crate::config::RxNavConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, Service};

/// HTTP client for the NLM RxNav service.
#[derive(Debug, Clone)]
pub struct RxNavClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: usize,
    approximate_max_entries: u32,
    request_timeout: Duration,
    circuit_breaker: Arc<CircuitBreaker>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugsResponse {
    #[serde(default)]
    drug_group: DrugGroup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrugGroup {
    #[serde(default)]
    concept_group: Option<Vec<ConceptGroup>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptGroup {
    #[serde(default)]
    concept_properties: Option<Vec<ConceptProperties>>,
}

#[derive(Debug, Deserialize)]
struct ConceptProperties {
    #[serde(default)]
    rxcui: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproximateResponse {
    #[serde(default)]
    approximate_group: ApproximateGroup,
}

#[derive(Debug, Default, Deserialize)]
struct ApproximateGroup {
    #[serde(default)]
    candidate: Option<Vec<ApproximateCandidate>>,
}

#[derive(Debug, Deserialize)]
struct ApproximateCandidate {
    #[serde(default)]
    rxcui: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    score: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PropertiesResponse {
    properties: Option<ConceptProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NdcStatusResponse {
    ndc_status: Option<NdcStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NdcStatus {
    #[serde(default)]
    rxcui: String,
    #[serde(default)]
    concept_name: String,
}

fn flatten_drug_group(response: DrugsResponse) -> Vec<ConceptHit> {
    response
        .drug_group
        .concept_group
        .unwrap_or_default()
        .into_iter()
        .flat_map(|group| group.concept_properties.unwrap_or_default())
        .filter(|p| !p.rxcui.is_empty() && !p.name.is_empty())
        .map(|p| ConceptHit::new(p.name, p.rxcui))
        .collect()
}

/// Approximate rows in rank order, one per concept.
fn approximate_rows(response: ApproximateResponse) -> Vec<ApproximateCandidate> {
    let mut seen = HashSet::new();
    response
        .approximate_group
        .candidate
        .unwrap_or_default()
        .into_iter()
        .filter(|c| !c.rxcui.is_empty() && seen.insert(c.rxcui.clone()))
        .collect()
}

fn map_send_error(error: reqwest::Error, timeout: Duration) -> LookupFailure {
    if error.is_timeout() {
        LookupFailure::Timeout(timeout)
    } else {
        LookupFailure::Unavailable(error.to_string())
    }
}

impl RxNavClient {
    pub fn new(config: &RxNavConfig, request_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            approximate_max_entries: config.approximate_max_entries,
            request_timeout,
            circuit_breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        }
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Arc::new(CircuitBreaker::new(config));
        self
    }

    /// Skip the endpoint while its circuit is open and record the outcome.
    /// A miss is an answer, not an outage.
    async fn guarded<T, F>(&self, tier: LookupTier, call: F) -> Result<T, LookupFailure>
    where
        F: Future<Output = Result<T, LookupFailure>>,
    {
        let service = Service::Lookup(tier);
        if self.circuit_breaker.is_open(service) {
            return Err(LookupFailure::Unavailable(format!("{service} circuit open")));
        }

        let outcome = call.await;
        match &outcome {
            Err(failure) if failure.is_outage() => self.circuit_breaker.record_failure(service),
            _ => self.circuit_breaker.record_success(service),
        }
        outcome
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, LookupFailure> {
        let url = format!("{}{}", self.base_url, path);
        let fetch = || async {
            let response = self
                .http
                .get(&url)
                .query(query)
                .timeout(self.request_timeout)
                .send()
                .await
                .map_err(|e| map_send_error(e, self.request_timeout))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(LookupFailure::NotFound);
            }
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LookupFailure::Unavailable(format!("HTTP {}", status)));
            }
            if !status.is_success() {
                return Err(LookupFailure::MalformedResponse(format!(
                    "unexpected HTTP {}",
                    status
                )));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| LookupFailure::MalformedResponse(e.to_string()))
        };

        fetch
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_times(self.max_retries),
            )
            .when(LookupFailure::is_transient)
            .notify(|err, delay| {
                tracing::debug!(path = path, error = %err, delay = ?delay, "Retrying RxNav request");
            })
            .await
    }

    async fn concept_name(&self, rxcui: &str) -> Result<Option<String>, LookupFailure> {
        let response: PropertiesResponse = self
            .get_json(&format!("/rxcui/{}/properties.json", rxcui), &[])
            .await?;
        Ok(response
            .properties
            .map(|p| p.name)
            .filter(|name| !name.is_empty()))
    }

    async fn drugs(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure> {
        let response: DrugsResponse = self
            .get_json("/drugs.json", &[("name", term.to_string())])
            .await?;
        Ok(flatten_drug_group(response))
    }

    async fn approximate_term(&self, term: &str) -> Result<Vec<ApproximateHit>, LookupFailure> {
        let response: ApproximateResponse = self
            .get_json(
                "/approximateTerm.json",
                &[
                    ("term", term.to_string()),
                    ("maxEntries", self.approximate_max_entries.to_string()),
                ],
            )
            .await?;

        let mut hits = Vec::new();
        for row in approximate_rows(response) {
            let name = match row.name.filter(|n| !n.is_empty()) {
                Some(name) => name,
                None => match self.concept_name(&row.rxcui).await {
                    Ok(Some(name)) => name,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(rxcui = %row.rxcui, error = %e, "Skipping approximate row without a name");
                        continue;
                    }
                },
            };
            let score = row.score.and_then(|s| s.trim().parse::<f64>().ok());
            hits.push(ApproximateHit::new(name, row.rxcui, score));
        }
        Ok(hits)
    }

    async fn ndc_status(&self, code: &str) -> Result<Option<ConceptHit>, LookupFailure> {
        for ndc in ndc_candidates(code) {
            let response: NdcStatusResponse = match self
                .get_json("/ndcstatus.json", &[("ndc", ndc.as_str().to_string())])
                .await
            {
                Ok(response) => response,
                Err(LookupFailure::NotFound) => continue,
                Err(e) => return Err(e),
            };

            if let Some(status) = response.ndc_status {
                if !status.rxcui.is_empty() && !status.concept_name.is_empty() {
                    tracing::debug!(ndc = %ndc, rxcui = %status.rxcui, "Barcode resolved via NDC");
                    return Ok(Some(ConceptHit::new(status.concept_name, status.rxcui)));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl LookupClient for RxNavClient {
    async fn exact_query(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure> {
        self.guarded(LookupTier::Exact, self.drugs(term)).await
    }

    async fn approximate_query(&self, term: &str) -> Result<Vec<ApproximateHit>, LookupFailure> {
        self.guarded(LookupTier::Approximate, self.approximate_term(term))
            .await
    }

    async fn resolve_identifier(&self, code: &str) -> Result<Option<ConceptHit>, LookupFailure> {
        self.guarded(LookupTier::Barcode, self.ndc_status(code)).await
    }

    fn name(&self) -> &str {
        "rxnav"
    }
}
