//! Runtime configuration: timeouts, concurrency, resilience, cache,
//! arbitration backend and the RxNav endpoint.
//!
//! Durations are written in humantime form (`5s`, `1m 30s`); plain integers
//! are read as seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use rxverify_core::ConfigError;

use crate::resilience::CircuitBreakerConfig;

/// Default RxNav REST root.
pub const DEFAULT_RXNAV_URL: &str = "https://rxnav.nlm.nih.gov/REST";

/// Default Anthropic model used for arbitration.
pub const DEFAULT_ARBITRATION_MODEL: &str = "claude-haiku-4-5";

/// Configuration for the async resolution runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-call timeout for exact and approximate lookups
    #[serde(with = "humantime_duration")]
    pub lookup_timeout: Duration,

    /// Timeout for barcode identifier resolution
    #[serde(with = "humantime_duration")]
    pub barcode_timeout: Duration,

    /// Timeout for one arbitration call
    #[serde(with = "humantime_duration")]
    pub arbitration_timeout: Duration,

    /// Documents resolved concurrently in a batch
    pub batch_concurrency: usize,

    pub circuit_breaker: CircuitBreakerConfig,

    pub arbitration: ArbitrationConfig,

    pub cache: CacheConfig,

    pub rxnav: RxNavConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(5),
            barcode_timeout: Duration::from_secs(5),
            arbitration_timeout: Duration::from_secs(15),
            batch_concurrency: 4,
            circuit_breaker: CircuitBreakerConfig::default(),
            arbitration: ArbitrationConfig::default(),
            cache: CacheConfig::default(),
            rxnav: RxNavConfig::default(),
        }
    }
}

/// LLM arbitration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Off by default; without it ambiguous pairs resolve to the leader
    pub enabled: bool,

    /// Provider type registered in the provider registry
    pub provider: String,

    pub model: String,

    /// Maximum tokens for the verdict
    pub max_tokens: u32,

    /// Total token budget shared by all arbitration calls in a process
    pub token_budget: u32,

    /// Optional provider endpoint override
    pub base_url: Option<String>,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "anthropic".to_string(),
            model: DEFAULT_ARBITRATION_MODEL.to_string(),
            max_tokens: 300,
            token_budget: 50_000,
            base_url: None,
        }
    }
}

impl ArbitrationConfig {
    /// Provider configuration as passed to a provider factory.
    pub fn provider_config(&self) -> serde_json::Value {
        let mut config = serde_json::json!({ "model": self.model });
        if let Some(url) = &self.base_url {
            config["base_url"] = serde_json::Value::String(url.clone());
        }
        config
    }
}

/// Lookup response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// RxNav client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxNavConfig {
    pub base_url: String,

    /// Retries for transient failures, on top of the first attempt
    pub max_retries: usize,

    /// `maxEntries` for approximate-term queries
    pub approximate_max_entries: u32,
}

impl Default for RxNavConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RXNAV_URL.to_string(),
            max_retries: 2,
            approximate_max_entries: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("lookup_timeout", self.lookup_timeout),
            ("barcode_timeout", self.barcode_timeout),
            ("arbitration_timeout", self.arbitration_timeout),
            ("circuit_breaker.recovery_timeout", self.circuit_breaker.recovery_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "batch_concurrency",
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "circuit_breaker.failure_threshold",
            });
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Zero {
                field: "cache.max_entries",
            });
        }
        if !self.rxnav.base_url.starts_with("http://") && !self.rxnav.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "rxnav.base_url must start with http:// or https://, got '{}'",
                self.rxnav.base_url
            )));
        }
        if self.arbitration.enabled && self.arbitration.provider.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "arbitration.provider is required when arbitration is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter for `Duration` fields in humantime notation.
pub mod humantime_duration {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Repr::Text(text) => humantime::parse_duration(text.trim()).map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.arbitration_timeout, Duration::from_secs(15));
        assert_eq!(config.batch_concurrency, 4);
        assert!(!config.arbitration.enabled);
        assert_eq!(config.rxnav.base_url, DEFAULT_RXNAV_URL);
    }

    #[test]
    fn test_yaml_durations() {
        let yaml = r#"
lookup_timeout: 2s
arbitration_timeout: 20
cache:
  ttl: 10m
arbitration:
  enabled: true
  model: claude-sonnet-4-5
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lookup_timeout, Duration::from_secs(2));
        assert_eq!(config.arbitration_timeout, Duration::from_secs(20));
        assert_eq!(config.barcode_timeout, Duration::from_secs(5));
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert!(config.arbitration.enabled);
        assert_eq!(config.arbitration.provider, "anthropic");
    }

    #[test]
    fn test_durations_serialize_as_text() {
        let json = serde_json::to_value(RuntimeConfig::default()).unwrap();
        assert_eq!(json["lookup_timeout"], "5s");
        assert_eq!(json["cache"]["ttl"], "1h");
    }

    #[test]
    fn test_validation_failures() {
        let config = RuntimeConfig {
            batch_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero { .. })));

        let mut config = RuntimeConfig::default();
        config.rxnav.base_url = "rxnav.local".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = RuntimeConfig {
            lookup_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "lookup_timeout"
            })
        );
    }

    #[test]
    fn test_provider_config() {
        let mut arbitration = ArbitrationConfig::default();
        arbitration.base_url = Some("https://proxy.internal/v1".to_string());
        let value = arbitration.provider_config();
        assert_eq!(value["model"], DEFAULT_ARBITRATION_MODEL);
        assert_eq!(value["base_url"], "https://proxy.internal/v1");
    }
}
