//! Configuration file loading and `RXVERIFY_*` environment overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use rxverify_core::ResolutionConfig;
use rxverify_runtime::RuntimeConfig;

pub const ENV_ACCEPTANCE_THRESHOLD: &str = "RXVERIFY_ACCEPTANCE_THRESHOLD";
pub const ENV_AMBIGUITY_GAP: &str = "RXVERIFY_AMBIGUITY_GAP";
pub const ENV_RXNAV_URL: &str = "RXVERIFY_RXNAV_URL";
pub const ENV_ARBITRATION: &str = "RXVERIFY_ARBITRATION";

/// Contents of an `rxverify.yaml` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub resolution: ResolutionConfig,
    pub runtime: RuntimeConfig,
}

impl CliConfig {
    /// Load from `path` (defaults when absent), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var(ENV_ACCEPTANCE_THRESHOLD) {
            self.resolution.acceptance_threshold = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_ACCEPTANCE_THRESHOLD} is not a number: '{value}'"))?;
        }
        if let Some(value) = var(ENV_AMBIGUITY_GAP) {
            self.resolution.ambiguity_gap_points = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_AMBIGUITY_GAP} is not a number: '{value}'"))?;
        }
        if let Some(value) = var(ENV_RXNAV_URL) {
            self.runtime.rxnav.base_url = value.trim().to_string();
        }
        if let Some(value) = var(ENV_ARBITRATION) {
            self.runtime.arbitration.enabled = parse_flag(ENV_ARBITRATION, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.resolution
            .validate()
            .context("Invalid resolution configuration")?;
        self.runtime
            .validate()
            .context("Invalid runtime configuration")?;
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{name} must be a boolean, got '{other}'"),
    }
}
