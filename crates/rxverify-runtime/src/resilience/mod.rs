//! Guards around the external services a resolution depends on.

mod budget;
mod circuit_breaker;

pub use budget::{BudgetTracker, LlmUsage};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

use rxverify_core::LookupTier;
use std::fmt;

/// External dependency guarded by a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Lookup(LookupTier),
    Arbitration,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Lookup(tier) => write!(f, "{tier}_lookup"),
            Service::Arbitration => write!(f, "arbitration"),
        }
    }
}
