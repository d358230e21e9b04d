//! Pocketci Runner
//!
//! A long-running agent that polls the orchestrator for pipeline runs,
//! re-clones the repository at the run's commit, and executes the pipeline
//! through the build-engine CLI. Completion is reported back whether the
//! build succeeded or failed.

mod config;
mod execution;
mod poller;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocketci_client::OrchestratorClient;
use pocketci_engine::EngineCli;

use crate::config::Config;
use crate::execution::Executor;
use crate::poller::PipelinePoller;

#[derive(Parser)]
#[command(name = "pocketci-runner")]
#[command(about = "Pocketci pipeline runner agent", long_about = None)]
struct Cli {
    /// URL of the orchestrator control plane
    #[arg(long = "control-plane")]
    control_plane: String,

    /// Name identifying this runner
    #[arg(long = "runner-name")]
    runner_name: String,

    /// Seconds between pipeline polls
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Max number of pipelines to run in parallel
    #[arg(long, default_value_t = 10)]
    parallelism: usize,

    /// Base directory for pipeline workspaces (defaults to the system
    /// temp dir)
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pocketci_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config {
        control_plane: cli.control_plane,
        runner_name: cli.runner_name,
        poll_interval: Duration::from_secs(cli.interval),
        parallelism: cli.parallelism,
        workspace_base: cli.workspace.unwrap_or_else(std::env::temp_dir),
    };
    config.validate()?;

    info!(
        "starting pocketci runner {} against {}",
        config.runner_name, config.control_plane
    );

    let engine = EngineCli::from_env();
    engine
        .available()
        .await
        .context("build engine is not available")?;

    let username = std::env::var("GITHUB_USERNAME").unwrap_or_default();
    let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
    let credentials = (!username.is_empty()).then_some((username.as_str(), token.as_str()));

    let executor = Arc::new(Executor::new(
        engine,
        credentials,
        config.workspace_base.clone(),
    ));
    let client = Arc::new(OrchestratorClient::new(config.control_plane.clone()));

    let poller = PipelinePoller::new(config, client, executor);
    poller.run().await;

    Ok(())
}
