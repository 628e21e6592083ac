//! Drug nomenclature lookup clients.
//!
//! [`LookupClient`] is the seam between the resolution engine and the
//! nomenclature service. Every operation can fail on its own; callers treat
//! a failure as "no candidates from this tier".

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use rxverify_core::{ApproximateHit, ConceptHit};

mod cached;
mod fixture;
#[cfg(feature = "rxnav")]
mod rxnav;

pub use cached::CachedLookupClient;
pub use fixture::{LookupFixture, StaticLookupClient};
#[cfg(feature = "rxnav")]
pub use rxnav::RxNavClient;

/// Why a lookup produced nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found")]
    NotFound,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl LookupFailure {
    /// Failures that say something about the service's health.
    ///
    /// A miss is a valid answer and never trips a circuit.
    pub fn is_outage(&self) -> bool {
        !matches!(self, LookupFailure::NotFound)
    }

    /// Failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupFailure::Timeout(_) | LookupFailure::Unavailable(_))
    }
}

/// Client for the drug nomenclature service.
#[async_trait]
pub trait LookupClient: Send + Sync {
    /// Concepts whose name matches `term` exactly (service-side normalization).
    async fn exact_query(&self, term: &str) -> Result<Vec<ConceptHit>, LookupFailure>;

    /// Ranked approximate matches for `term`.
    async fn approximate_query(&self, term: &str) -> Result<Vec<ApproximateHit>, LookupFailure>;

    /// Authoritative concept for a decoded barcode value, if it denotes one.
    async fn resolve_identifier(&self, code: &str) -> Result<Option<ConceptHit>, LookupFailure>;

    fn name(&self) -> &str;
}
