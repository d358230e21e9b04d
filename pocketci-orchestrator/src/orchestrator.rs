//! End-to-end webhook handling
//!
//! One `handle` call per delivery: normalize the event, materialize the
//! repository, read the repo's `pocketci.yaml`, introspect the CI module,
//! select pipelines (manifest or convention), and enqueue the result. Every
//! failure here is per-event: it gets logged by the caller and the
//! orchestrator keeps serving.

use std::sync::Arc;

use serde_json::value::RawValue;
use thiserror::Error;
use tracing::info;

use pocketci_core::domain::event::{EventEnvelope, GITHUB_VENDOR, GitInfo, Webhook};
use pocketci_core::domain::pipeline::Pipeline;
use pocketci_core::domain::spec::Spec;
use pocketci_engine::{EngineCli, EngineError, ModuleIntrospector};

use crate::dispatch::Dispatcher;
use crate::repo::{FetchError, Fetcher};
use crate::select::{self, SelectError};
use crate::vcs::github::{self, VcsError};

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("vendor {0} is not supported")]
    UnsupportedVendor(String),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to parse pocketci.yaml: {0}")]
    Spec(#[from] serde_yaml::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error("webhook payload is not a JSON document: {0}")]
    Payload(String),
}

/// Wires ingestion, selection, and dispatch together.
pub struct Orchestrator {
    pub dispatcher: Arc<Dispatcher>,
    engine: EngineCli,
    introspector: Arc<dyn ModuleIntrospector>,
    fetcher: Fetcher,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>, engine: EngineCli, fetcher: Fetcher) -> Self {
        let introspector: Arc<dyn ModuleIntrospector> = Arc::new(engine.clone());
        Self {
            dispatcher,
            engine,
            introspector,
            fetcher,
        }
    }

    /// Processes one authenticated webhook delivery.
    pub async fn handle(&self, webhook: Webhook) -> Result<(), HandleError> {
        if webhook.vendor != GITHUB_VENDOR {
            return Err(HandleError::UnsupportedVendor(webhook.vendor));
        }

        let mut event = github::parse_webhook(&webhook.event_type, &webhook.payload)?;

        let url = format!("https://github.com/{}", event.repo_full_name);
        let (snapshot, changed_files) = self
            .fetcher
            .fetch(
                &url,
                &event.git_ref,
                &event.sha,
                event.base_ref.as_deref(),
                event.base_sha.as_deref(),
            )
            .await?;
        event.changed_files = changed_files;

        let config = tokio::fs::read_to_string(snapshot.path().join("pocketci.yaml"))
            .await
            .ok();
        let spec = Spec::parse(config.as_deref())?;

        let meta = self
            .introspector
            .introspect(snapshot.path(), &spec.module_path)
            .await?;

        let pipelines: Vec<Pipeline> = match select::manifest_function(&meta) {
            Some(function) => {
                let call = format!("{} contents", function.kebab_name());
                let stdout = self
                    .engine
                    .call(
                        snapshot.path(),
                        &spec.module_path,
                        &call,
                        &event.env_vars,
                        &spec.secrets,
                    )
                    .await?;
                let manifest: Vec<Pipeline> =
                    serde_json::from_str(stdout.trim()).map_err(SelectError::Manifest)?;
                select::manifest::filter_pipelines(&event, manifest)?
            }
            None => select::convention_pipelines(&event, &meta, &spec.module_path)?,
        };

        if pipelines.is_empty() {
            info!(
                "no pipelines matched event {}/{} on {}",
                event.event_type, event.filter, event.repo_full_name
            );
            return Ok(());
        }

        let payload = String::from_utf8(event.payload.clone())
            .map_err(|e| HandleError::Payload(e.to_string()))?;
        let raw_event =
            RawValue::from_string(payload).map_err(|e| HandleError::Payload(e.to_string()))?;
        let envelope = EventEnvelope {
            event_type: event.event_type.clone(),
            filter: event.filter.clone(),
            changes: event.changed_files.clone(),
            repo_name: event.repo_name().to_string(),
        };
        let git_info = GitInfo {
            branch: event.git_ref.clone(),
            sha: event.sha.clone(),
        };

        let admitted = self
            .dispatcher
            .enqueue(&raw_event, &envelope, &git_info, &pipelines);
        info!(
            "dispatched {admitted} pipeline run(s) for {}/{} on {}",
            event.event_type, event.filter, event.repo_full_name
        );

        Ok(())
    }
}
