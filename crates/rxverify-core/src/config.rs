//! Resolution thresholds.
//!
//! Every tunable that changes which candidate wins lives here and is passed
//! in at construction time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from validating configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("{field} must be a non-negative number, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Thresholds applied by the scorer guards and the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Minimum similarity for a textual candidate to be accepted
    pub acceptance_threshold: f64,

    /// Top-two gap, in points of similarity x 100, below which arbitration runs
    pub ambiguity_gap_points: f64,

    /// Guesses shorter than this many characters are discarded
    pub min_guess_len: usize,

    /// Drop candidates whose formulation contradicts the label text
    pub formulation_filter: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.50,
            ambiguity_gap_points: 15.0,
            min_guess_len: 2,
            formulation_filter: true,
        }
    }
}

const GAP_PRECISION: f64 = 1e9;

fn gap_points(leader: f64, runner_up: f64) -> f64 {
    ((leader - runner_up) * 100.0 * GAP_PRECISION).round() / GAP_PRECISION
}

impl ResolutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "acceptance_threshold",
                value: self.acceptance_threshold,
            });
        }
        if !self.ambiguity_gap_points.is_finite() || self.ambiguity_gap_points < 0.0 {
            return Err(ConfigError::Negative {
                field: "ambiguity_gap_points",
                value: self.ambiguity_gap_points,
            });
        }
        if self.min_guess_len == 0 {
            return Err(ConfigError::Zero {
                field: "min_guess_len",
            });
        }
        Ok(())
    }

    /// Whether two accepted similarities are too close to call.
    ///
    /// The gap is rounded to nine decimal places of a point first, so a gap
    /// of exactly the threshold is never ambiguous whatever the float error.
    pub fn is_ambiguous(&self, leader: f64, runner_up: f64) -> bool {
        gap_points(leader, runner_up) < self.ambiguity_gap_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResolutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acceptance_threshold, 0.50);
        assert_eq!(config.ambiguity_gap_points, 15.0);
        assert_eq!(config.min_guess_len, 2);
        assert!(config.formulation_filter);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = ResolutionConfig {
            acceptance_threshold: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { .. })
        ));

        let config = ResolutionConfig {
            ambiguity_gap_points: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Negative { .. })));

        let config = ResolutionConfig {
            min_guess_len: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero { .. })));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: ResolutionConfig = serde_yaml::from_str("acceptance_threshold: 0.6\n").unwrap();
        assert_eq!(config.acceptance_threshold, 0.6);
        assert_eq!(config.ambiguity_gap_points, 15.0);
    }

    #[test]
    fn test_ambiguity_gap() {
        let config = ResolutionConfig::default();
        assert!(config.is_ambiguous(0.91, 0.80));
        assert!(!config.is_ambiguous(0.91, 0.70));
    }

    #[test]
    fn test_gap_at_threshold_is_not_ambiguous() {
        let config = ResolutionConfig::default();
        // 0.95 - 0.80 is 14.999... and 0.65 - 0.50 is 15.000...2 in f64
        assert!(!config.is_ambiguous(0.95, 0.80));
        assert!(!config.is_ambiguous(0.65, 0.50));
        assert!(!config.is_ambiguous(0.30, 0.15));
        assert!(config.is_ambiguous(0.95, 0.8001));
    }
}
