//! retention-preview: dry-run a retention policy against a catalog snapshot.
//!
//! Reads a YAML document with a `policy` and a `catalog` (projects →
//! repositories → tags), runs one dry-run execution on in-memory
//! collaborators, and prints the execution, its tasks, and every
//! retain/delete decision as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use retention_core::{Config, Execution, History, Policy, Query, Task};
use retention_engine::{
    CatalogSnapshot, CronCapability, InMemoryCatalog, InMemoryStore, RetentionManager,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Preview which tags a retention policy would delete.
#[derive(Parser, Debug)]
#[command(name = "retention-preview", version, about)]
struct Cli {
    /// YAML file holding `policy` and `catalog`.
    input: PathBuf,

    /// Config profile (reads `{PROFILE}_RETENTION_*` overrides).
    #[arg(long, env = "RETENTION_PROFILE")]
    profile: Option<String>,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Deserialize)]
struct PreviewInput {
    policy: Policy,
    #[serde(default)]
    catalog: CatalogSnapshot,
}

#[derive(Debug, Serialize)]
struct PreviewReport {
    execution: Execution,
    tasks: Vec<Task>,
    histories: Vec<History>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    retention_core::config::load_dotenv();
    let cli = Cli::parse();

    let mut config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.scheduler.enabled = false;
    config.log_summary();

    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let input: PreviewInput = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;

    let catalog = Arc::new(InMemoryCatalog::from_snapshot(&input.catalog));
    let manager = RetentionManager::new(
        Arc::new(InMemoryStore::new()),
        catalog,
        Arc::new(CronCapability::new()),
        &config,
    );

    let policy_id = manager
        .create_policy(&input.policy)
        .await
        .context("policy rejected")?;
    let started = manager
        .trigger_execution(policy_id, true)
        .await
        .context("failed to start dry run")?;
    let execution = manager.wait_execution(started.id).await?;

    let all = Query::default();
    let report = PreviewReport {
        tasks: manager.list_tasks(execution.id, &all).await?,
        histories: manager.list_histories(execution.id, &all).await?,
        execution,
    };
    info!(
        status = %report.execution.status,
        decisions = report.histories.len(),
        "dry run finished"
    );

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}
