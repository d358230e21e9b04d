//! Webhook and event domain types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The only vendor currently wired in. Other vendors plug in at the
/// orchestrator's vendor dispatch.
pub const GITHUB_VENDOR: &str = "github";

pub const GITHUB_PULL_REQUEST: &str = "pull_request";
pub const GITHUB_PUSH: &str = "push";
pub const GITHUB_RELEASE: &str = "release";

/// A raw webhook delivery as received by the HTTP façade.
///
/// The signature is consumed (and discarded) at the HTTP boundary; by the
/// time a `Webhook` exists the payload has already been authenticated.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub vendor: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// A vendor-neutral view of one webhook delivery.
///
/// Created by the vendor adapter, enriched with the changed-file list by the
/// repository fetcher, then handed to the pipeline selector. The raw payload
/// travels untouched so pipelines see exactly the bytes the vendor sent.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub vendor: String,
    pub event_type: String,
    /// Event sub-category: the PR action for `pull_request`, the bare branch
    /// for `push`, the release action for `release`.
    pub filter: String,
    pub repo_full_name: String,
    pub git_ref: String,
    pub sha: String,
    pub base_ref: Option<String>,
    pub base_sha: Option<String>,
    pub pr_number: Option<u64>,
    /// Files changed by the commit (or PR) this event points at. Always
    /// present, possibly empty.
    pub changed_files: Vec<String>,
    pub payload: Vec<u8>,
    /// GitHub-style context variables exported into pipeline invocations.
    pub env_vars: HashMap<String, String>,
}

impl NormalizedEvent {
    /// The short repository name, without the owner prefix.
    pub fn repo_name(&self) -> &str {
        self.repo_full_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo_full_name)
    }
}

/// Checkout coordinates a runner needs to re-materialize the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub branch: String,
    pub sha: String,
}

/// Event metadata carried alongside a pipeline run.
///
/// This is deliberately a sibling of the raw payload, never a wrapper around
/// it: the event file handed to pipelines is assembled from these fields plus
/// the verbatim payload, each in its own place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub filter: String,
    #[serde(default)]
    pub changes: Vec<String>,
    pub repo_name: String,
}

/// Strips the `refs/heads/` and `refs/pull/` prefixes off a ref, yielding
/// the bare branch name.
pub fn branch_name(git_ref: &str) -> &str {
    let v = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
    v.strip_prefix("refs/pull/").unwrap_or(v)
}
