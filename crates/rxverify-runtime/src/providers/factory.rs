//! Provider construction by name.
//!
//! `runtime.arbitration.provider` in the configuration names a provider type;
//! the registry maps that name to a factory building it from JSON settings.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::config::ArbitrationConfig;

/// Builds providers of one type.
pub trait ProviderFactory: Send + Sync {
    /// Name used in `arbitration.provider`.
    fn provider_type(&self) -> &'static str;

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Check settings (credentials, URLs) without building anything.
    fn validate_config(&self, settings: &JsonValue) -> Result<(), ProviderError>;
}

/// Known provider types.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the providers compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        registry
    }

    /// Add a factory. A later factory with the same type replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    pub fn create(
        &self,
        provider_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.lookup(provider_type)?;
        factory.validate_config(settings)?;
        factory.create(settings)
    }

    /// Provider for an arbitration section.
    pub fn create_for(&self, config: &ArbitrationConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.create(&config.provider, &config.provider_config())
    }

    pub fn validate(&self, provider_type: &str, settings: &JsonValue) -> Result<(), ProviderError> {
        self.lookup(provider_type)?.validate_config(settings)
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    fn lookup(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no arbitration provider named '{}' (built in: {})",
                provider_type,
                self.available_types().join(", ")
            ))
        })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
