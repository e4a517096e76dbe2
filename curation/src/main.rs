//! Command-line entry point for the curation engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use curation::config::EngineConfig;
use curation::inference::ProviderRegistry;
use curation::pipeline::Pipeline;
use curation::report::DebugReporter;
use curation::sources::{JsonFileSource, JsonLinesSink};

#[derive(Debug, Parser)]
#[command(name = "curation", about = "Rank candidate documents into a consensus digest")]
struct Args {
    /// Engine configuration (TOML). Omit to use the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Candidate pool, a JSON array of candidate documents.
    #[arg(long)]
    candidates: PathBuf,

    /// Where to write the digest JSON.
    #[arg(long, default_value = "digest.json")]
    output: PathBuf,

    /// Append shortlisted candidates to this JSON-lines file.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Dump intermediate stage snapshots into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let source = Arc::new(JsonFileSource::new(&args.candidates));
    let mut pipeline = Pipeline::new(config, source, &ProviderRegistry)
        .context("assembling pipeline")?;
    if let Some(path) = &args.save {
        pipeline = pipeline.with_sink(Arc::new(JsonLinesSink::new(path)));
    }
    if let Some(dir) = &args.debug_dir {
        pipeline = pipeline.with_reporter(DebugReporter::new(dir));
    }

    let outcome = pipeline.run().await.context("running pipeline")?;
    info!(
        picks = outcome.picks.len(),
        shortlist = outcome.shortlist.len(),
        total_cost = outcome.total_cost,
        "digest ready"
    );
    for (rank, pick) in outcome.picks.iter().enumerate() {
        info!(rank = rank + 1, title = %pick.title, link = %pick.link, "pick");
    }

    let rendered = serde_json::to_string_pretty(&outcome)?;
    tokio::fs::write(&args.output, rendered)
        .await
        .with_context(|| format!("writing digest to {}", args.output.display()))?;
    info!(path = %args.output.display(), "digest written");
    Ok(())
}
