//! scan-replay: run rule documents against recorded provider responses.
//!
//! Loads the rule directory and scan config, serves every provider call from
//! fixture files, and prints one JSON line per check result to stdout. The
//! run summary goes to stderr.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use skyaudit_core::{load_dotenv, ScanConfig, Verdict};
use skyaudit_engine::fixture::{FixtureSet, ReplayFactory};
use skyaudit_engine::{CancelToken, ChannelSink, ProviderFactories, ScanOrchestrator, StaticScopes};
use skyaudit_rules::loader::{LoadStatus, RuleLoader};
use skyaudit_rules::metadata::InMemoryMetadataStore;

// ── CLI ─────────────────────────────────────────────────────────────

/// Replay a compliance scan from recorded provider responses.
#[derive(Parser, Debug)]
#[command(name = "scan-replay", version, about)]
struct Cli {
    /// Directory holding service rule documents.
    #[arg(long, env = "SKYAUDIT_RULES_DIR", default_value = "data/rules")]
    rules_dir: PathBuf,

    /// Scan config (TOML). Defaults are used when the file does not exist.
    #[arg(long, env = "SKYAUDIT_CONFIG", default_value = "config/scan.toml")]
    config: PathBuf,

    /// Fixture files with recorded responses; earlier files match first.
    #[arg(long = "fixture", env = "SKYAUDIT_FIXTURES", value_delimiter = ',', required = true)]
    fixtures: Vec<PathBuf>,

    /// Rule metadata (YAML list) used for coverage warnings.
    #[arg(long, env = "SKYAUDIT_METADATA")]
    metadata: Option<PathBuf>,

    /// Exit with status 2 when any non-excepted FAIL or ERROR is reported.
    #[arg(long, default_value_t = false)]
    fail_on_findings: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        let cfg = ScanConfig::from_file(&cli.config)
            .with_context(|| format!("loading scan config {}", cli.config.display()))?;
        info!(path = %cli.config.display(), "loaded scan config");
        cfg
    } else {
        warn!(path = %cli.config.display(), "scan config not found, using defaults");
        let mut cfg = ScanConfig::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        cfg
    };
    config.log_summary();

    let mut loader = RuleLoader::new(cli.rules_dir.clone());
    if let Some(path) = &cli.metadata {
        let store = InMemoryMetadataStore::from_file(path)
            .with_context(|| format!("loading rule metadata {}", path.display()))?;
        loader = loader.with_metadata(Arc::new(store));
    }
    for result in loader.load_all()? {
        if let LoadStatus::Failed { error } = &result.status {
            warn!(path = %result.path.display(), error = %error, "rule document rejected");
        }
    }
    let rules = loader.rule_set();
    if rules.is_empty() {
        anyhow::bail!("no valid rule documents under {}", cli.rules_dir.display());
    }

    let mut fixtures = FixtureSet::default();
    for path in &cli.fixtures {
        let set = FixtureSet::from_file(path)
            .with_context(|| format!("loading fixture {}", path.display()))?;
        info!(path = %path.display(), calls = set.calls.len(), "loaded fixture");
        fixtures.extend(set);
    }

    // Every provider named by a target account is served from the fixtures.
    let replay = Arc::new(ReplayFactory::new(fixtures));
    let providers: BTreeSet<&str> = config.accounts.iter().map(|a| a.provider.as_str()).collect();
    let mut factories = ProviderFactories::new();
    for provider in providers {
        factories.register(provider, replay.clone());
    }

    let (sink, mut rx) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        let mut findings = 0usize;
        while let Some(result) = rx.recv().await {
            if !result.excepted && result.verdict != Verdict::Pass {
                findings += 1;
            }
            match serde_json::to_string(&result) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(rule_id = %result.rule_id, error = %e, "failed to serialize result"),
            }
        }
        findings
    });

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling scan");
            on_signal.cancel();
        }
    });

    let scopes = StaticScopes::from_config(&config);
    let orchestrator = ScanOrchestrator::new(config, rules, factories, Arc::new(sink));
    let summary = orchestrator.run(&scopes, cancel).await?;

    // Dropping the orchestrator closes the result channel.
    drop(orchestrator);
    let findings = printer.await?;

    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    info!(calls = replay.invocations().len(), findings, "scan-replay finished");

    if cli.fail_on_findings && findings > 0 {
        std::process::exit(2);
    }
    Ok(())
}
