//! In-memory lookup client backed by fixed tables.
//!
//! Used by tests and by the CLI's offline mode. Terms match
//! case-insensitively. Barcode entries may be keyed by the raw scanned value
//! or by any NDC-11 the value expands to. Failures and latency can be
//! injected per tier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rxverify_core::{ndc_candidates, ApproximateHit, ConceptHit, LookupTier};

use super::{LookupClient, LookupFailure};

/// Lookup tables, in the shape of an offline fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupFixture {
    /// term -> exact concept rows
    pub exact: BTreeMap<String, Vec<ConceptHit>>,

    /// term -> ranked approximate rows
    pub approximate: BTreeMap<String, Vec<ApproximateHit>>,

    /// barcode value or NDC-11 -> concept
    pub barcodes: BTreeMap<String, ConceptHit>,
}

/// Fixture-backed [`LookupClient`].
#[derive(Debug, Default)]
pub struct StaticLookupClient {
    exact: HashMap<String, Vec<ConceptHit>>,
    approximate: HashMap<String, Vec<ApproximateHit>>,
    barcodes: HashMap<String, ConceptHit>,
    failures: HashMap<LookupTier, LookupFailure>,
    latency: HashMap<LookupTier, Duration>,
    calls: [AtomicUsize; 3],
}

fn key(term: &str) -> String {
    term.trim().to_lowercase()
}

fn slot(tier: LookupTier) -> usize {
    match tier {
        LookupTier::Barcode => 0,
        LookupTier::Exact => 1,
        LookupTier::Approximate => 2,
    }
}

impl StaticLookupClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: LookupFixture) -> Self {
        let mut client = Self::new();
        for (term, rows) in fixture.exact {
            client.exact.insert(key(&term), rows);
        }
        for (term, rows) in fixture.approximate {
            client.approximate.insert(key(&term), rows);
        }
        for (code, hit) in fixture.barcodes {
            client.barcodes.insert(code.trim().to_string(), hit);
        }
        client
    }

    pub fn with_exact(mut self, term: &str, rows: Vec<ConceptHit>) -> Self {
        self.exact.insert(key(term), rows);
        self
    }

    pub fn with_approximate(mut self, term: &str, rows: Vec<ApproximateHit>) -> Self {
        self.approximate.insert(key(term), rows);
        self
    }

    pub fn with_barcode(mut self, code: &str, hit: ConceptHit) -> Self {
        self.barcodes.insert(code.trim().to_string(), hit);
        self
    }

    /// Make every call on `tier` fail with `failure`.
    pub fn with_failure(mut self, tier: LookupTier, failure: LookupFailure) -> Self {
        self.failures.insert(tier, failure);
        self
    }

    /// Delay every call on `tier` by `delay` (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, tier: LookupTier, delay: Duration) -> Self {
        self.latency.insert(tier, delay);
        self
    }

    /// Calls received on `tier`.
    pub fn calls(&self, tier: LookupTier) -> usize {
        self.calls[slot(tier)].load(Ordering::SeqCst)
    }

    async fn enter(&self, tier: LookupTier) -> Result<(), LookupFailure> {
        self.calls[slot(tier)].fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.latency.get(&tier) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(&tier) {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LookupClient for StaticLookupClient {
    async fn exact_query(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure> {
        self.enter(LookupTier::Exact).await?;
        Ok(self.exact.get(&key(term)).cloned().unwrap_or_default())
    }

    async fn approximate_query(&self, term: &str) -> Result<Vec<ApproximateHit>, LookupFailure> {
        self.enter(LookupTier::Approximate).await?;
        Ok(self.approximate.get(&key(term)).cloned().unwrap_or_default())
    }

    async fn resolve_identifier(&self, code: &str) -> Result<Option<ConceptHit>, LookupFailure> {
        self.enter(LookupTier::Barcode).await?;
        if let Some(hit) = self.barcodes.get(code.trim()) {
            return Ok(Some(hit.clone()));
        }
        Ok(ndc_candidates(code)
            .iter()
            .find_map(|ndc| self.barcodes.get(ndc.as_str()).cloned()))
    }

    fn name(&self) -> &str {
        "static"
    }
}
