//! Convention-based function matching
//!
//! The anatomy of a convention function is `on<Vendor><Event><Filter>` plus
//! the top-level `dispatch` fallback. Selection funnels from the most
//! fine-grained name to the least; for vendor=github, event=pull_request,
//! filter=opened the funnel is:
//!
//! 1. `onGithubPullRequestOpened`
//! 2. `onGithubPullRequest` (receives `--filter`)
//! 3. `onGithub` (receives `--event --filter`)
//! 4. `dispatch` (receives `--vendor --event --filter`)
//!
//! Any function whose name *ends with* one of those forms (e.g.
//! `lintOnGithubPullRequest`) is a peer of that level. All matches at the
//! most specific level that yields at least one are returned; lower levels
//! are never consulted.

use heck::{ToLowerCamelCase, ToUpperCamelCase};
use tracing::debug;

use pocketci_core::glob::match_any;
use pocketci_engine::module::{FunctionMeta, ModuleMeta};

use crate::select::SelectError;

/// A matched function and the argument string the runner must append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub args: String,
}

struct Level {
    kebab: String,
    with_vendor: bool,
    with_event: bool,
    with_filter: bool,
}

/// Resolves the set of functions to invoke for an event.
///
/// A function is admitted only if its declared arguments accept the event:
/// an `onChanges` default must match at least one changed file, and any
/// `vendor`/`event`/`filter` default must list the event's value. Missing
/// one of the arguments its level requires is a configuration error.
pub fn match_functions(
    vendor: &str,
    event_type: &str,
    filter: &str,
    changes: &[String],
    meta: &ModuleMeta,
) -> Result<Vec<FunctionCall>, SelectError> {
    let root = meta.root_object().ok_or(SelectError::NoFunctionsMatched)?;

    let levels = [
        Level {
            kebab: format!("on-{vendor}-{event_type}-{filter}"),
            with_vendor: false,
            with_event: false,
            with_filter: false,
        },
        Level {
            kebab: format!("on-{vendor}-{event_type}"),
            with_vendor: false,
            with_event: false,
            with_filter: true,
        },
        Level {
            kebab: format!("on-{vendor}"),
            with_vendor: false,
            with_event: true,
            with_filter: true,
        },
        Level {
            kebab: "dispatch".to_string(),
            with_vendor: true,
            with_event: true,
            with_filter: true,
        },
    ];

    for level in levels {
        let exact = level.kebab.to_lower_camel_case();
        let suffix = level.kebab.to_upper_camel_case();

        let mut candidates: Vec<&FunctionMeta> = root
            .functions
            .iter()
            .filter(|f| f.name == exact || f.name.ends_with(&suffix))
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let mut matched = Vec::new();
        for function in candidates {
            if let Some(call) =
                admit(function, &level, vendor, event_type, filter, changes)?
            {
                matched.push(call);
            }
        }

        if !matched.is_empty() {
            return Ok(matched);
        }
    }

    Err(SelectError::NoFunctionsMatched)
}

/// Applies the argument prefilters and required-signature checks to one
/// candidate. `Ok(None)` is a silent skip; `Err` is a configuration error.
fn admit(
    function: &FunctionMeta,
    level: &Level,
    vendor: &str,
    event_type: &str,
    filter: &str,
    changes: &[String],
) -> Result<Option<FunctionCall>, SelectError> {
    let name = function.kebab_name();

    if let Some(arg) = function.arg("onChanges") {
        let patterns = arg.default_values();
        if !match_any(changes, &patterns) {
            debug!("function {name}: `onChanges` does not match the changed files");
            return Ok(None);
        }
    }

    if let Some(arg) = function.arg("vendor") {
        if !arg.allows(vendor) {
            debug!("function {name}: `vendor` default does not admit {vendor}");
            return Ok(None);
        }
    }

    if let Some(arg) = function.arg("filter") {
        if !arg.allows(filter) {
            debug!("function {name}: `filter` default does not admit {filter}");
            return Ok(None);
        }
    }

    if let Some(arg) = function.arg("event") {
        if !arg.allows(event_type) {
            debug!("function {name}: `event` default does not admit {event_type}");
            return Ok(None);
        }
    }

    let required = [
        (function.has_arg("src"), "src"),
        (function.has_arg("eventTrigger"), "eventTrigger"),
        (!level.with_vendor || function.has_arg("vendor"), "vendor"),
        (!level.with_event || function.has_arg("event"), "event"),
        (!level.with_filter || function.has_arg("filter"), "filter"),
    ];
    for (ok, missing) in required {
        if !ok {
            return Err(SelectError::Config(format!(
                "{name} is missing the `{missing}` argument"
            )));
        }
    }

    let mut args = Vec::new();
    if level.with_filter {
        args.push(format!("--filter {filter}"));
    }
    if level.with_event {
        args.push(format!("--event {event_type}"));
    }
    if level.with_vendor {
        args.push(format!("--vendor {vendor}"));
    }
    if function.has_arg("onChanges") {
        args.push(format!("--on-changes {}", changes.join(",")));
    }

    Ok(Some(FunctionCall {
        name,
        args: args.join(" "),
    }))
}
