//! Pipeline execution
//!
//! Each claimed run gets a fresh workspace: the repository is re-cloned at
//! the run's commit (snapshots never travel over the wire), the event files
//! are materialized next to it, and the engine CLI is invoked with the run's
//! module and call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::process::Command;
use tracing::{debug, info};

use pocketci_core::domain::pipeline::PipelineRun;
use pocketci_engine::EngineCli;

/// Normalized event record handed to pipelines as their `eventTrigger`
/// file. The payload is embedded verbatim as its own field; the metadata
/// fields sit flat beside it.
#[derive(Serialize)]
struct EventFile<'a> {
    event_type: &'a str,
    filter: &'a str,
    changes: &'a [String],
    repo_name: &'a str,
    payload: &'a RawValue,
}

/// Executes pipeline runs inside throwaway workspaces.
pub struct Executor {
    engine: EngineCli,
    /// netrc contents for authenticated clones, if credentials were given.
    netrc: Option<String>,
    workspace_base: PathBuf,
}

impl Executor {
    pub fn new(
        engine: EngineCli,
        credentials: Option<(&str, &str)>,
        workspace_base: PathBuf,
    ) -> Self {
        let netrc = credentials
            .map(|(user, token)| format!("machine github.com login {user} password {token}\n"));
        Self {
            engine,
            netrc,
            workspace_base,
        }
    }

    /// Clones, materializes the event files, and invokes the engine.
    ///
    /// An `Err` here means the pipeline failed; the caller still reports
    /// completion to the control plane.
    pub async fn run(&self, run: &PipelineRun) -> Result<()> {
        let workspace = tempfile::Builder::new()
            .prefix("pocketci-")
            .tempdir_in(&self.workspace_base)
            .context("failed to create workspace")?;

        let home = workspace.path().join("home");
        std::fs::create_dir(&home).context("failed to create workspace home")?;
        if let Some(netrc) = &self.netrc {
            std::fs::write(home.join(".netrc"), netrc).context("failed to write netrc")?;
        }

        let repo_url = format!("https://github.com/{}", run.repository);
        let checkout = workspace.path().join("repo");

        info!(
            "cloning repository {repo_url} ref={} sha={}",
            run.git_info.branch, run.git_info.sha
        );

        let mut clone_args = vec!["clone".to_string(), "--single-branch".to_string()];
        if !run.git_info.branch.is_empty() {
            clone_args.push("--branch".to_string());
            clone_args.push(run.git_info.branch.clone());
        }
        clone_args.push("--depth".to_string());
        clone_args.push("1".to_string());
        clone_args.push(repo_url.clone());
        clone_args.push(checkout.to_string_lossy().into_owned());

        run_git(&clone_args, None, &home)
            .await
            .with_context(|| format!("failed to clone {repo_url}"))?;

        if !run.git_info.sha.is_empty() {
            run_git(
                &["checkout".to_string(), run.git_info.sha.clone()],
                Some(&checkout),
                &home,
            )
            .await
            .with_context(|| format!("failed to check out {}", run.git_info.sha))?;
        }

        std::fs::write(checkout.join("raw-event.json"), run.raw_event.get())
            .context("failed to write raw event file")?;
        std::fs::write(checkout.join("event.json"), event_file(run)?)
            .context("failed to write event file")?;

        let env = context_env(run);

        debug!("invoking engine for pipeline {} ({})", run.name, run.id);
        let stdout = self
            .engine
            .call(&checkout, &run.module, &run.call, &env, &[])
            .await
            .with_context(|| format!("pipeline {} failed", run.name))?;

        info!("pipeline {} ({}) output:\n{stdout}", run.name, run.id);
        Ok(())
    }
}

/// Renders the normalized event record for the run.
fn event_file(run: &PipelineRun) -> Result<String> {
    serde_json::to_string(&EventFile {
        event_type: &run.event.event_type,
        filter: &run.event.filter,
        changes: &run.event.changes,
        repo_name: &run.event.repo_name,
        payload: &run.raw_event,
    })
    .context("failed to encode event file")
}

/// GitHub Actions-style context for the engine invocation.
fn context_env(run: &PipelineRun) -> HashMap<String, String> {
    HashMap::from([
        ("GITHUB_SHA".to_string(), run.git_info.sha.clone()),
        ("GITHUB_ACTIONS".to_string(), "true".to_string()),
        (
            "GITHUB_EVENT_NAME".to_string(),
            run.event.event_type.clone(),
        ),
        (
            "GITHUB_EVENT_PATH".to_string(),
            "./raw-event.json".to_string(),
        ),
        ("GITHUB_REF".to_string(), run.git_info.branch.clone()),
    ])
}

async fn run_git(args: &[String], cwd: Option<&Path>, home: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .env("HOME", home)
        .env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await.context("failed to run git")?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.first().map(String::as_str).unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}
