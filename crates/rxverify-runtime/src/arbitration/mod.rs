//! Arbitration between two near-tied candidates.
//!
//! An [`Arbitrator`] either picks one of the two presented candidates or
//! defers. Deferral is always safe: the orchestrator falls back to the
//! top-scored candidate.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use rxverify_core::{ArbitrationRequest, ArbitrationVerdict, VerdictError};

use crate::config::RuntimeConfig;
use crate::providers::{ProviderError, ProviderRegistry};
use crate::RuntimeError;

mod llm;

pub use llm::LlmArbitrator;

/// Why an arbitration produced no verdict.
#[derive(Error, Debug)]
pub enum ArbitrationError {
    #[error("{0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Verdict(#[from] VerdictError),

    #[error("token budget exhausted")]
    BudgetExhausted,

    #[error("circuit open")]
    CircuitOpen,
}

/// Capability that chooses between two candidates.
#[async_trait]
pub trait Arbitrator: Send + Sync {
    /// `Ok(None)` defers to the top-scored candidate.
    async fn arbitrate(
        &self,
        request: &ArbitrationRequest,
    ) -> Result<Option<ArbitrationVerdict>, ArbitrationError>;

    fn name(&self) -> &str;
}

/// Arbitrator that always defers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArbitration;

#[async_trait]
impl Arbitrator for NoArbitration {
    async fn arbitrate(
        &self,
        _request: &ArbitrationRequest,
    ) -> Result<Option<ArbitrationVerdict>, ArbitrationError> {
        Err(ArbitrationError::Unavailable("arbitration disabled".to_string()))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Arbitrator described by the runtime configuration.
///
/// Disabled arbitration yields [`NoArbitration`]. Otherwise the configured
/// provider type is created from `registry`.
pub fn arbitrator_from_config(
    config: &RuntimeConfig,
    registry: &ProviderRegistry,
) -> Result<Arc<dyn Arbitrator>, RuntimeError> {
    if !config.arbitration.enabled {
        return Ok(Arc::new(NoArbitration));
    }

    let provider = registry.create_for(&config.arbitration)?;
    tracing::info!(
        provider = %config.arbitration.provider,
        model = %config.arbitration.model,
        "LLM arbitration enabled"
    );
    Ok(Arc::new(LlmArbitrator::from_config(provider, config)))
}
