//! Pipeline domain types
//!
//! A [`Pipeline`] is the user-declared unit of CI work, either produced by a
//! `pipelines`-family module function (manifest mode) or synthesized from a
//! convention-function match. A [`PipelineRun`] is one materialized execution
//! of a pipeline command, owned by the dispatcher until a runner completes it.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::domain::event::{EventEnvelope, GitInfo};

/// Pipeline declaration as emitted by a user module.
///
/// Wire names follow the manifest JSON schema: `pr_actions` for the PR action
/// allow-list and `after` for the names of pipelines this one depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub module: String,
    #[serde(default, rename = "pr_actions")]
    pub actions: Vec<String>,
    #[serde(default)]
    pub on_pr: bool,
    #[serde(default)]
    pub on_push: bool,
    #[serde(default)]
    pub branches: Vec<String>,
    /// One or more commands, `&`-delimited. Each command becomes its own
    /// [`PipelineRun`] sharing this pipeline's dependencies.
    #[serde(default)]
    pub exec: String,
    #[serde(default, rename = "after")]
    pub deps: Vec<String>,
    /// Set by the orchestrator once the owning repository is known; never
    /// part of the manifest itself.
    #[serde(default)]
    pub repository: String,
}

impl Pipeline {
    /// The individual commands of `exec`, trimmed, empty entries dropped.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.exec.split('&').map(str::trim).filter(|c| !c.is_empty())
    }
}

/// A queued, running, or finished execution of one pipeline command.
///
/// `raw_event` is carried verbatim (not re-encoded) so the runner hands the
/// pipeline exactly the payload the vendor delivered. The event metadata the
/// runner needs lives in sibling fields rather than being merged into the
/// payload record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: i64,
    pub name: String,
    pub call: String,
    #[serde(default)]
    pub parents: Vec<i64>,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub module: String,
    pub raw_event: Box<RawValue>,
    /// Metadata of the event that triggered this run, kept separate from the
    /// payload.
    #[serde(default)]
    pub event: EventEnvelope,
    pub git_info: GitInfo,
    /// Dependency names, resolved to `parents` at enqueue time.
    #[serde(skip)]
    pub deps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_wire_names() {
        let raw = r#"[{
            "name": "checks",
            "runner": "large",
            "changes": ["**/**.go", "go.mod"],
            "module": "ci",
            "pr_actions": ["opened", "synchronize"],
            "on_pr": true,
            "on_push": true,
            "branches": ["main"],
            "exec": "test & lint",
            "after": ["setup"]
        }]"#;

        let pipelines: Vec<Pipeline> = serde_json::from_str(raw).unwrap();
        assert_eq!(pipelines.len(), 1);

        let p = &pipelines[0];
        assert_eq!(p.name, "checks");
        assert_eq!(p.runner.as_deref(), Some("large"));
        assert_eq!(p.actions, vec!["opened", "synchronize"]);
        assert_eq!(p.deps, vec!["setup"]);
        assert!(p.on_pr && p.on_push);
    }

    #[test]
    fn manifest_defaults_missing_fields() {
        let p: Pipeline = serde_json::from_str(r#"{"name": "lint", "exec": "lint"}"#).unwrap();
        assert!(p.runner.is_none());
        assert!(p.changes.is_empty());
        assert!(p.actions.is_empty());
        assert!(!p.on_pr && !p.on_push);
        assert!(p.deps.is_empty());
    }

    #[test]
    fn commands_split_on_ampersand() {
        let p = Pipeline {
            exec: "test &  lint& ".to_string(),
            ..Default::default()
        };
        let cmds: Vec<&str> = p.commands().collect();
        assert_eq!(cmds, vec!["test", "lint"]);
    }

    #[test]
    fn run_serializes_raw_event_verbatim() {
        let payload = r#"{"action":"opened","number":7}"#;
        let run = PipelineRun {
            id: 1,
            name: "checks".to_string(),
            call: "test".to_string(),
            parents: vec![],
            repository: "pocketci/pocketci".to_string(),
            runner: None,
            changes: vec![],
            module: "ci".to_string(),
            raw_event: RawValue::from_string(payload.to_string()).unwrap(),
            event: EventEnvelope {
                event_type: "pull_request".to_string(),
                filter: "opened".to_string(),
                changes: vec![],
                repo_name: "pocketci".to_string(),
            },
            git_info: GitInfo {
                branch: "main".to_string(),
                sha: "abc123".to_string(),
            },
            deps: vec![],
        };

        let encoded = serde_json::to_string(&run).unwrap();
        assert!(encoded.contains(payload));

        let decoded: PipelineRun = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.raw_event.get(), payload);
        assert_eq!(decoded.git_info, run.git_info);
    }
}
