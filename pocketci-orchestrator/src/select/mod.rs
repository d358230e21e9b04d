//! Pipeline selection
//!
//! Two strategies decide what runs for an event. Manifest mode: the module
//! exposes a `pipelines`-family function returning a file of pipeline JSON,
//! which gets rendered and filtered against the event. Convention mode: the
//! module's root object carries `on<Vendor><Event><Filter>`-style functions
//! that are matched by name specificity. Both strategies produce the same
//! [`Pipeline`] records and feed the same dispatcher.

pub mod convention;
pub mod manifest;

use thiserror::Error;

use pocketci_core::domain::event::NormalizedEvent;
use pocketci_core::domain::pipeline::Pipeline;
use pocketci_engine::module::{FunctionMeta, ModuleMeta};

/// Function names that switch a module into manifest mode when they return
/// a file.
const MANIFEST_FUNCTIONS: [&str; 3] = ["pipelines", "ciPipelines", "dispatch"];

#[derive(Debug, Error)]
pub enum SelectError {
    /// The module is miswired: a matched function is missing a required
    /// argument, or a pipeline double-triggers. Nothing gets enqueued.
    #[error("configuration error: {0}")]
    Config(String),

    /// No convention function matched the event. Not fatal to the
    /// orchestrator, just no work for this webhook.
    #[error("did not find a matching function on the module's root object")]
    NoFunctionsMatched,

    /// The manifest function's output was not a pipeline JSON array.
    #[error("invalid pipeline manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Picks the manifest entry point, if the module has one.
pub fn manifest_function(meta: &ModuleMeta) -> Option<&FunctionMeta> {
    let root = meta.root_object()?;
    MANIFEST_FUNCTIONS
        .iter()
        .find_map(|name| root.function(name).filter(|f| f.returns_file()))
}

/// Runs convention matching and bridges the matches into [`Pipeline`]
/// records so they flow through the dispatcher like manifest pipelines.
///
/// The emitted call carries the repository source and the event file the
/// runner materializes next to the checkout.
pub fn convention_pipelines(
    event: &NormalizedEvent,
    meta: &ModuleMeta,
    module_path: &str,
) -> Result<Vec<Pipeline>, SelectError> {
    let calls = convention::match_functions(
        &event.vendor,
        &event.event_type,
        &event.filter,
        &event.changed_files,
        meta,
    )?;

    Ok(calls
        .into_iter()
        .map(|call| {
            let mut exec = call.name.clone();
            if !call.args.is_empty() {
                exec.push(' ');
                exec.push_str(&call.args);
            }
            exec.push_str(" --src . --event-trigger ./event.json");

            Pipeline {
                name: call.name,
                exec,
                module: module_path.to_string(),
                repository: event.repo_full_name.clone(),
                ..Default::default()
            }
        })
        .collect())
}
