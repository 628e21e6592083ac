//! Process-wide token allowance for arbitration.
//!
//! Every verdict call is checked against the allowance before the provider
//! is contacted. When the next call could overrun it, arbitration defers to
//! the leading candidate.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Running totals across arbitration calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub calls: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cache_read_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

impl LlmUsage {
    fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.calls += 1;
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(usage.completion_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(usage.cache_read_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total());
        self.estimated_cost_usd += cost_usd(usage, model);
    }
}

/// List price in USD per million tokens (input, output, cache read).
fn rates(model: &str) -> (f64, f64, f64) {
    if model.contains("haiku") {
        (1.0, 5.0, 0.1)
    } else if model.contains("opus") {
        (5.0, 25.0, 0.5)
    } else {
        (3.0, 15.0, 0.3)
    }
}

fn cost_usd(usage: &TokenUsage, model: &str) -> f64 {
    let (input, output, cache_read) = rates(model);
    (f64::from(usage.prompt_tokens) * input
        + f64::from(usage.completion_tokens) * output
        + f64::from(usage.cache_read_tokens) * cache_read)
        / 1_000_000.0
}

/// Owned by one arbitrator; the allowance spans every call it makes.
#[derive(Debug)]
pub struct BudgetTracker {
    limit: u32,
    usage: Mutex<LlmUsage>,
}

impl BudgetTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            usage: Mutex::new(LlmUsage::default()),
        }
    }

    /// Whether a call estimated at `tokens` still fits.
    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record_usage(&self, usage: &TokenUsage, model: &str) {
        self.usage.lock().add(usage, model);
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.usage.lock().total_tokens)
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            ..Default::default()
        }
    }

    #[test]
    fn test_allowance_shrinks_with_each_verdict() {
        let tracker = BudgetTracker::new(1_000);
        assert!(tracker.can_afford(1_000));
        assert!(!tracker.can_afford(1_001));

        tracker.record_usage(&usage(420, 30), "claude-haiku-4-5");
        tracker.record_usage(&usage(410, 25), "claude-haiku-4-5");

        assert_eq!(tracker.remaining(), 115);
        assert!(!tracker.can_afford(450));

        let totals = tracker.usage();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.total_tokens, 885);
    }

    #[test]
    fn test_overrun_saturates() {
        let tracker = BudgetTracker::new(100);
        tracker.record_usage(&usage(150, 10), "claude-haiku-4-5");
        assert_eq!(tracker.remaining(), 0);
        assert!(tracker.can_afford(0));
    }

    #[test]
    fn test_cost_by_model_family() {
        let tracker = BudgetTracker::new(u32::MAX);
        tracker.record_usage(&usage(1_000, 500), "claude-sonnet-4-5");
        // 1000 * $3/M + 500 * $15/M
        assert!((tracker.usage().estimated_cost_usd - 0.0105).abs() < 1e-9);

        let haiku = BudgetTracker::new(u32::MAX);
        haiku.record_usage(&usage(1_000, 500), "claude-haiku-4-5");
        assert!((haiku.usage().estimated_cost_usd - 0.0035).abs() < 1e-9);
    }
}
