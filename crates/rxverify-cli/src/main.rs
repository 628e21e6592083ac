//! rxverify - resolve drug label evidence to RxNorm concepts.
//!
//! Reads evidence documents (extracted entities, decoded barcode, OCR text)
//! as JSON and prints each with its verification attached. Logs go to
//! stderr so stdout stays machine-readable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rxverify_core::{token_set_similarity, EvidenceDocument};
use rxverify_runtime::{
    arbitrator_from_config, LookupClient, LookupFixture, ProviderRegistry,
    ResolutionOrchestrator, RxNavClient, StaticLookupClient,
};

mod config;
mod output;

use config::CliConfig;
use output::VerifiedDocument;

#[derive(Parser, Debug)]
#[command(name = "rxverify")]
#[command(about = "Resolve drug label evidence to RxNorm concepts")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "RXVERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Resolve against a fixture file instead of RxNav
    #[arg(long, global = true, value_name = "FIXTURE_YAML")]
    offline: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve one evidence document (`-` reads stdin)
    Resolve { input: PathBuf },

    /// Resolve a JSON array of evidence documents (`-` reads stdin)
    Batch { input: PathBuf },

    /// Token-set similarity between two strings
    Score { a: String, b: String },

    /// Validate configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rxverify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Score { a, b } => {
            let report = serde_json::json!({
                "a": a,
                "b": b,
                "similarity": token_set_similarity(a, b),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CheckConfig => {
            let config = CliConfig::load(cli.config.as_deref())?;
            let arbitration = &config.runtime.arbitration;
            if arbitration.enabled {
                ProviderRegistry::with_defaults()
                    .validate(&arbitration.provider, &arbitration.provider_config())
                    .context("Arbitration provider is not usable")?;
            }
            info!("Configuration is valid");
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Resolve { input } => {
            let document: EvidenceDocument = serde_json::from_str(&read_input(input)?)
                .with_context(|| format!("Failed to parse evidence document {}", input.display()))?;
            let orchestrator = build_orchestrator(&cli)?;

            let outcome = orchestrator.resolve_document(&document).await;
            let verified = VerifiedDocument::new(document, outcome);
            println!("{}", serde_json::to_string_pretty(&verified)?);
        }
        Commands::Batch { input } => {
            let documents: Vec<EvidenceDocument> = serde_json::from_str(&read_input(input)?)
                .with_context(|| format!("Failed to parse evidence batch {}", input.display()))?;
            let orchestrator = build_orchestrator(&cli)?;

            info!(documents = documents.len(), "Resolving batch");
            let outcomes = orchestrator.resolve_batch(&documents).await;
            let verified: Vec<VerifiedDocument> = documents
                .into_iter()
                .zip(outcomes)
                .map(|(document, outcome)| VerifiedDocument::new(document, outcome))
                .collect();

            let resolved = verified
                .iter()
                .filter(|v| v.resolution.path.is_resolved())
                .count();
            info!(resolved, total = verified.len(), "Batch complete");
            println!("{}", serde_json::to_string_pretty(&verified)?);
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn build_orchestrator(cli: &Cli) -> Result<ResolutionOrchestrator> {
    let config = CliConfig::load(cli.config.as_deref())?;

    let lookup: Arc<dyn LookupClient> = match &cli.offline {
        Some(path) => {
            let fixture: LookupFixture = serde_yaml::from_str(&read_input(path)?)
                .with_context(|| format!("Failed to parse fixture {}", path.display()))?;
            info!(fixture = %path.display(), "Using offline lookup fixture");
            Arc::new(StaticLookupClient::from_fixture(fixture))
        }
        None => {
            info!(url = %config.runtime.rxnav.base_url, "Using RxNav lookup");
            Arc::new(
                RxNavClient::new(&config.runtime.rxnav, config.runtime.lookup_timeout)
                    .with_circuit_breaker(config.runtime.circuit_breaker.clone()),
            )
        }
    };

    let arbitrator = arbitrator_from_config(&config.runtime, &ProviderRegistry::with_defaults())
        .context("Failed to set up arbitration")?;

    ResolutionOrchestrator::builder()
        .lookup(lookup)
        .arbitrator(arbitrator)
        .resolution_config(config.resolution)
        .runtime_config(config.runtime)
        .build()
        .context("Failed to build resolution orchestrator")
}
