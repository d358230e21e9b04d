//! Manifest-based pipeline filtering
//!
//! The module's manifest function renders a JSON array of pipeline records;
//! this module decides which of those records the event actually triggers.

use tracing::debug;

use pocketci_core::domain::event::{GITHUB_PULL_REQUEST, GITHUB_PUSH, NormalizedEvent};
use pocketci_core::domain::pipeline::Pipeline;
use pocketci_core::glob::match_any;

use crate::select::SelectError;

/// Filters manifest pipelines against the event.
///
/// - A non-empty `changes` list must match at least one changed file.
/// - A pull request keeps pipelines with `on_pr` whose `pr_actions` allow
///   the action. If such a pipeline *also* has a push trigger matching the
///   PR's head branch, the same commit would double-trigger: that is a
///   configuration error and nothing from the batch runs.
/// - A push keeps pipelines with `on_push` whose `branches` allow the
///   branch.
///
/// Pipelines matching neither arm are dropped.
pub fn filter_pipelines(
    event: &NormalizedEvent,
    pipelines: Vec<Pipeline>,
) -> Result<Vec<Pipeline>, SelectError> {
    let mut run = Vec::new();

    for mut pipeline in pipelines {
        if !pipeline.changes.is_empty() && !match_any(&event.changed_files, &pipeline.changes) {
            debug!(
                "pipeline {}: changes do not match the changed files",
                pipeline.name
            );
            continue;
        }

        pipeline.repository = event.repo_full_name.clone();

        match event.event_type.as_str() {
            GITHUB_PULL_REQUEST
                if pipeline.on_pr
                    && (pipeline.actions.is_empty()
                        || pipeline.actions.iter().any(|a| *a == event.filter)) =>
            {
                if pipeline.on_push
                    && (pipeline.branches.is_empty()
                        || pipeline.branches.iter().any(|b| *b == event.git_ref))
                {
                    return Err(SelectError::Config(format!(
                        "pipeline {}: pull request is already matched by its push trigger",
                        pipeline.name
                    )));
                }

                debug!(
                    "pipeline {} matched on pull request action {}",
                    pipeline.name, event.filter
                );
                run.push(pipeline);
            }
            GITHUB_PUSH
                if pipeline.on_push
                    && (pipeline.branches.is_empty()
                        || pipeline.branches.iter().any(|b| *b == event.git_ref)) =>
            {
                debug!(
                    "pipeline {} matched on push to {}",
                    pipeline.name, event.git_ref
                );
                run.push(pipeline);
            }
            _ => {
                debug!(
                    "pipeline {} does not trigger on this {} event",
                    pipeline.name, event.event_type
                );
            }
        }
    }

    Ok(run)
}
