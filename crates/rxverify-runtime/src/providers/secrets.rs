//! API keys for arbitration providers.
//!
//! Keys are moved into a [`SecretString`] when read; formatting an
//! [`ApiCredential`] prints where it came from, never its value.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Provider settings (`arbitration` section)
    Config,
    Environment,
    Programmatic,
}

impl CredentialSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Environment => "environment",
            Self::Programmatic => "programmatic",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// Read `settings[key]`, else the `env_var` environment variable.
    /// Blank values count as missing.
    pub fn from_config_or_env(
        settings: &JsonValue,
        key: &str,
        env_var: &str,
        label: &'static str,
    ) -> Result<Self, ProviderError> {
        match locate(settings, key, env_var) {
            Some((value, source)) => Ok(Self::new(value, source, label)),
            None => Err(ProviderError::NotConfigured(format!(
                "{label} missing: set '{key}' in provider settings or {env_var}"
            ))),
        }
    }

    pub fn is_available(settings: &JsonValue, key: &str, env_var: &str) -> bool {
        locate(settings, key, env_var).is_some()
    }

    /// Raw key, for the request header only.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

fn locate(settings: &JsonValue, key: &str, env_var: &str) -> Option<(String, CredentialSource)> {
    let from_settings = settings[key]
        .as_str()
        .filter(|v| !v.trim().is_empty())
        .map(|v| (v.to_string(), CredentialSource::Config));

    from_settings.or_else(|| {
        std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| (v, CredentialSource::Environment))
    })
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, {}, [REDACTED])", self.label, self.source)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Anthropic API key";

    #[test]
    fn test_formatting_never_shows_key() {
        let key = "sk-ant-api03-abcdef";
        let credential = ApiCredential::new(key, CredentialSource::Config, LABEL);

        let debug = format!("{credential:?}");
        assert!(!debug.contains(key));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(credential.to_string(), "Anthropic API key (config)");
        assert_eq!(credential.expose(), key);
    }

    #[test]
    fn test_settings_take_precedence() {
        let settings = serde_json::json!({ "api_key": "from-settings" });
        let credential =
            ApiCredential::from_config_or_env(&settings, "api_key", "RXVERIFY_UNSET_KEY_A", LABEL)
                .unwrap();
        assert_eq!(credential.expose(), "from-settings");
        assert_eq!(credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_blank_setting_counts_as_missing() {
        let settings = serde_json::json!({ "api_key": "  " });
        assert!(!ApiCredential::is_available(&settings, "api_key", "RXVERIFY_UNSET_KEY_B"));

        let err =
            ApiCredential::from_config_or_env(&settings, "api_key", "RXVERIFY_UNSET_KEY_B", LABEL)
                .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("api_key"));
        assert!(message.contains("RXVERIFY_UNSET_KEY_B"));
    }
}
