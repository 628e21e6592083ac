//! Per-service circuit breaking.
//!
//! Owned by the clients that call out: the RxNav client keeps one circuit
//! per endpoint and the LLM arbitrator one for its provider. A service that
//! keeps failing gets its circuit opened and is not called until
//! `recovery_timeout` has passed. The next calls are probes;
//! `success_threshold` successes close the circuit again and one failure
//! reopens it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::Service;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive outages that open a circuit
    pub failure_threshold: u32,

    #[serde(with = "crate::config::humantime_duration")]
    pub recovery_timeout: Duration,

    /// Probe successes that close a half-open circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed { failures: 0 }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<Service, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::default(),
        }
    }

    /// True while calls to `service` should be skipped. An open circuit past
    /// its recovery timeout moves to half-open here and lets the call through.
    pub fn is_open(&self, service: Service) -> bool {
        let mut circuits = self.circuits.lock();
        let Some(state) = circuits.get_mut(&service) else {
            return false;
        };
        match *state {
            CircuitState::Open { since } if since.elapsed() < self.config.recovery_timeout => true,
            CircuitState::Open { .. } => {
                *state = CircuitState::HalfOpen { successes: 0 };
                tracing::info!(%service, "Circuit half-open, probing");
                false
            }
            _ => false,
        }
    }

    pub fn record_success(&self, service: Service) {
        let mut circuits = self.circuits.lock();
        let state = circuits.entry(service).or_default();
        *state = match *state {
            CircuitState::HalfOpen { successes } if successes + 1 >= self.config.success_threshold => {
                tracing::info!(%service, "Circuit closed");
                CircuitState::Closed { failures: 0 }
            }
            CircuitState::HalfOpen { successes } => CircuitState::HalfOpen {
                successes: successes + 1,
            },
            CircuitState::Closed { .. } => CircuitState::Closed { failures: 0 },
            open @ CircuitState::Open { .. } => open,
        };
    }

    pub fn record_failure(&self, service: Service) {
        let mut circuits = self.circuits.lock();
        let state = circuits.entry(service).or_default();
        *state = match *state {
            CircuitState::Closed { failures } if failures + 1 >= self.config.failure_threshold => {
                tracing::warn!(%service, failures = failures + 1, "Circuit opened");
                CircuitState::Open {
                    since: Instant::now(),
                }
            }
            CircuitState::Closed { failures } => CircuitState::Closed {
                failures: failures + 1,
            },
            CircuitState::HalfOpen { .. } => {
                tracing::warn!(%service, "Probe failed, circuit reopened");
                CircuitState::Open {
                    since: Instant::now(),
                }
            }
            open @ CircuitState::Open { .. } => open,
        };
    }

    pub fn state(&self, service: Service) -> CircuitState {
        self.circuits
            .lock()
            .get(&service)
            .copied()
            .unwrap_or_default()
    }
}
