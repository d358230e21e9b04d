//! Pipeline run dispatcher
//!
//! Holds every pipeline run the orchestrator has admitted and serves the
//! claim/complete protocol runners drive. A run lives in exactly one of
//! three places: the queue (waiting), `running` (claimed by a runner), or
//! `done` (completed, successfully or not). A single mutex guards all three
//! plus the id counter, so a batch enqueue commits atomically and a run can
//! never be claimed twice.
//!
//! State is in-memory only; an orchestrator restart drops in-flight runs.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::value::RawValue;
use thiserror::Error;
use tracing::{debug, info};

use pocketci_core::domain::event::{EventEnvelope, GitInfo};
use pocketci_core::domain::pipeline::{Pipeline, PipelineRun};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pipeline {0} not found")]
    NotFound(i64),
}

#[derive(Default)]
struct DispatcherState {
    queue: Vec<PipelineRun>,
    running: HashMap<i64, PipelineRun>,
    done: HashMap<i64, PipelineRun>,
    last_id: i64,
}

/// In-memory dispatcher shared by the webhook flow and the control plane.
#[derive(Default)]
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a batch of pipelines, expanding each `exec` command into its
    /// own run and resolving `after` names against the runs created in this
    /// same call. A dependency name that expanded into several runs blocks
    /// on all of them.
    ///
    /// The batch becomes visible to claimers all at once; ids are assigned
    /// in input order.
    pub fn enqueue(
        &self,
        raw_event: &RawValue,
        envelope: &EventEnvelope,
        git_info: &GitInfo,
        pipelines: &[Pipeline],
    ) -> usize {
        let mut state = self.state.lock().unwrap();

        let mut by_name: HashMap<&str, Vec<i64>> = HashMap::new();
        let mut batch: Vec<PipelineRun> = Vec::new();

        for pipeline in pipelines {
            for command in pipeline.commands() {
                state.last_id += 1;
                let run = PipelineRun {
                    id: state.last_id,
                    name: pipeline.name.clone(),
                    call: command.to_string(),
                    parents: Vec::new(),
                    repository: pipeline.repository.clone(),
                    runner: pipeline.runner.clone(),
                    changes: pipeline.changes.clone(),
                    module: pipeline.module.clone(),
                    raw_event: raw_event.to_owned(),
                    event: envelope.clone(),
                    git_info: git_info.clone(),
                    deps: pipeline.deps.clone(),
                };

                by_name.entry(&pipeline.name).or_default().push(run.id);
                info!("new pipeline run name={} call={}", run.name, run.call);
                batch.push(run);
            }
        }

        for run in &mut batch {
            for dep in &run.deps {
                if let Some(ids) = by_name.get(dep.as_str()) {
                    run.parents.extend(ids);
                }
            }
        }

        let admitted = batch.len();
        state.queue.extend(batch);
        admitted
    }

    /// Hands out the first queued run this runner may execute: not pinned to
    /// a different runner, and with every parent already done. Moving the
    /// run into `running` happens under the same lock as the scan, so each
    /// run is claimed at most once.
    pub fn claim(&self, runner: &str) -> Option<PipelineRun> {
        let mut state = self.state.lock().unwrap();

        let position = state.queue.iter().position(|run| {
            if let Some(pinned) = &run.runner {
                if pinned != runner {
                    debug!(
                        "skipping pipeline {}: pinned to runner {pinned}, requested by {runner}",
                        run.id
                    );
                    return false;
                }
            }
            run.parents.iter().all(|id| state.done.contains_key(id))
        })?;

        let run = state.queue.remove(position);
        state.running.insert(run.id, run.clone());
        Some(run)
    }

    /// Moves a running pipeline to `done`. Completion is terminal: the run
    /// is never re-queued.
    pub fn complete(&self, id: i64) -> Result<(), DispatchError> {
        let mut state = self.state.lock().unwrap();

        let run = state
            .running
            .remove(&id)
            .ok_or(DispatchError::NotFound(id))?;
        state.done.insert(id, run);
        Ok(())
    }
}
