//! Caching decorator for lookup clients.
//!
//! Nomenclature answers change rarely, and batches of photos of the same
//! shelf repeat the same terms. Successful responses (including empty
//! ones) are cached per operation in bounded TTL caches; failures are never
//! cached so a transient outage is not remembered.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use rxverify_core::{ApproximateHit, ConceptHit};

use super::{LookupClient, LookupFailure};

/// [`LookupClient`] that memoizes another client's successful responses.
pub struct CachedLookupClient {
    inner: Arc<dyn LookupClient>,
    exact: Cache<String, Vec<ConceptHit>>,
    approximate: Cache<String, Vec<ApproximateHit>>,
    identifiers: Cache<String, Option<ConceptHit>>,
}

fn term_key(term: &str) -> String {
    term.trim().to_lowercase()
}

impl CachedLookupClient {
    pub fn new(inner: Arc<dyn LookupClient>, max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner,
            exact: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            approximate: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            identifiers: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Drop every cached response.
    pub fn invalidate_all(&self) {
        self.exact.invalidate_all();
        self.approximate.invalidate_all();
        self.identifiers.invalidate_all();
    }
}

#[async_trait]
impl LookupClient for CachedLookupClient {
    async fn exact_query(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure> {
        let key = term_key(term);
        if let Some(rows) = self.exact.get(&key).await {
            tracing::trace!(term = %key, "Exact lookup cache hit");
            return Ok(rows);
        }
        let rows = self.inner.exact_query(term).await?;
        self.exact.insert(key, rows.clone()).await;
        Ok(rows)
    }

    async fn approximate_query(&self, term: &str) -> Result<Vec<ApproximateHit>, LookupFailure> {
        let key = term_key(term);
        if let Some(rows) = self.approximate.get(&key).await {
            tracing::trace!(term = %key, "Approximate lookup cache hit");
            return Ok(rows);
        }
        let rows = self.inner.approximate_query(term).await?;
        self.approximate.insert(key, rows.clone()).await;
        Ok(rows)
    }

    async fn resolve_identifier(&self, code: &str) -> Result<Option<ConceptHit>, LookupFailure> {
        let key = code.trim().to_string();
        if let Some(hit) = self.identifiers.get(&key).await {
            tracing::trace!(code = %key, "Barcode lookup cache hit");
            return Ok(hit);
        }
        let hit = self.inner.resolve_identifier(code).await?;
        self.identifiers.insert(key, hit.clone()).await;
        Ok(hit)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
