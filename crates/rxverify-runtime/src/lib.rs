//! # rxverify-runtime
//!
//! Async side of the candidate resolution engine.
//!
//! `rxverify-core` decides; this crate talks to the outside world:
//! - nomenclature lookups ([`LookupClient`]; RxNav behind the `rxnav` feature,
//!   with its own retry and circuit breaking)
//! - candidate generation with per-tier timeouts
//! - optional LLM arbitration ([`LlmArbitrator`]; Anthropic behind the
//!   `anthropic` feature) with its own circuit and token budget
//! - the [`ResolutionOrchestrator`] state machine and bounded batch resolution
//!
//! ## Degradation
//!
//! Resolution never returns an error. A dead lookup tier contributes no
//! candidates; a failed, slow or confused arbitrator defers to the
//! top-scored candidate. What degraded is recorded in the outcome's trace.
//! The orchestrator keeps no state between runs; resilience state lives in
//! the collaborators that own it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rxverify_runtime::{ResolutionOrchestrator, RxNavClient, RuntimeConfig};
//!
//! let config = RuntimeConfig::default();
//! let orchestrator = ResolutionOrchestrator::builder()
//!     .lookup(Arc::new(RxNavClient::new(&config.rxnav, config.lookup_timeout)))
//!     .runtime_config(config)
//!     .build()?;
//!
//! let outcome = orchestrator.resolve_document(&document).await;
//! println!("{} via {}", outcome.result.identifier().unwrap_or("-"), outcome.path());
//! ```

use thiserror::Error;

pub mod arbitration;
pub mod config;
pub mod generator;
pub mod lookup;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use arbitration::{arbitrator_from_config, ArbitrationError, Arbitrator, LlmArbitrator, NoArbitration};
pub use config::{ArbitrationConfig, CacheConfig, RuntimeConfig, RxNavConfig};
pub use generator::CandidateGenerator;
pub use lookup::{CachedLookupClient, LookupClient, LookupFailure, LookupFixture, StaticLookupClient};
pub use orchestrator::{ResolutionOrchestrator, ResolutionOrchestratorBuilder, ResolutionOutcome};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{BudgetTracker, CircuitBreaker, CircuitBreakerConfig, LlmUsage, Service};

#[cfg(feature = "rxnav")]
pub use lookup::RxNavClient;

use rxverify_core::ConfigError;

/// Errors raised while assembling the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
