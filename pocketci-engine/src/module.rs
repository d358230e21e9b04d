//! Engine module metadata
//!
//! A read-only view of a user's engine module: which objects it exposes,
//! which functions each object has, and what arguments (with defaults) each
//! function declares. The pipeline selector works entirely against this
//! metadata; the engine itself is only invoked once a function is chosen.

use std::path::Path;

use async_trait::async_trait;
use heck::{ToKebabCase, ToLowerCamelCase};
use serde::Deserialize;

use crate::error::EngineError;

/// Metadata of one engine module.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<ObjectMeta>,
}

/// An object exported by a module.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FunctionMeta>,
}

/// A function on a module object.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionMeta {
    pub name: String,
    /// Engine type name of the return value (e.g. `File`, `Directory`),
    /// when the function returns an object type.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgMeta>,
}

/// One declared function argument.
#[derive(Debug, Clone, Deserialize)]
pub struct ArgMeta {
    pub name: String,
    /// JSON-encoded default value as reported by the engine, if any.
    #[serde(default)]
    pub default_value: Option<String>,
}

impl ModuleMeta {
    /// The module's root object: the object whose lowerCamel name equals the
    /// module's lowerCamel name. Convention functions only count when they
    /// live on the root object.
    pub fn root_object(&self) -> Option<&ObjectMeta> {
        let want = self.name.to_lower_camel_case();
        self.objects
            .iter()
            .find(|o| o.name.to_lower_camel_case() == want)
    }
}

impl ObjectMeta {
    pub fn function(&self, name: &str) -> Option<&FunctionMeta> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl FunctionMeta {
    /// The function name as it is spelled on the engine CLI.
    pub fn kebab_name(&self) -> String {
        self.name.to_kebab_case()
    }

    pub fn arg(&self, name: &str) -> Option<&ArgMeta> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.arg(name).is_some()
    }

    /// Whether this function returns the engine `File` type.
    pub fn returns_file(&self) -> bool {
        self.returns.as_deref() == Some("File")
    }
}

impl ArgMeta {
    /// The default value split into its comma-separated entries, with the
    /// engine's JSON string quoting removed. Empty when no default is set.
    pub fn default_values(&self) -> Vec<String> {
        let raw = match self.default_value.as_deref() {
            Some(v) if !v.is_empty() => v.replace('"', ""),
            _ => return Vec::new(),
        };
        if raw.is_empty() {
            return Vec::new();
        }
        raw.split(',').map(|s| s.trim().to_string()).collect()
    }

    /// An argument with no default accepts any value; one with a default
    /// restricts the value to the default's comma-separated entries.
    pub fn allows(&self, value: &str) -> bool {
        let values = self.default_values();
        values.is_empty() || values.iter().any(|v| v == value)
    }
}

/// Asynchronous, fallible access to a module's metadata.
#[async_trait]
pub trait ModuleIntrospector: Send + Sync {
    async fn introspect(
        &self,
        repo_root: &Path,
        module_path: &str,
    ) -> Result<ModuleMeta, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, objects: Vec<ObjectMeta>) -> ModuleMeta {
        ModuleMeta {
            name: name.to_string(),
            objects,
        }
    }

    fn object(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: name.to_string(),
            functions: vec![],
        }
    }

    #[test]
    fn root_object_matches_module_name_case_insensitively() {
        let meta = module("my-ci", vec![object("Helper"), object("MyCi")]);
        assert_eq!(meta.root_object().unwrap().name, "MyCi");
    }

    #[test]
    fn root_object_absent_when_no_name_matches() {
        let meta = module("ci", vec![object("Helper")]);
        assert!(meta.root_object().is_none());
    }

    #[test]
    fn kebab_name_converts_camel_case() {
        let f = FunctionMeta {
            name: "onGithubPullRequestOpened".to_string(),
            returns: None,
            args: vec![],
        };
        assert_eq!(f.kebab_name(), "on-github-pull-request-opened");
    }

    #[test]
    fn default_values_strip_quotes_and_split() {
        let arg = ArgMeta {
            name: "onChanges".to_string(),
            default_value: Some("\"**/**.go,go.mod\"".to_string()),
        };
        assert_eq!(arg.default_values(), vec!["**/**.go", "go.mod"]);
    }

    #[test]
    fn missing_default_allows_everything() {
        let arg = ArgMeta {
            name: "filter".to_string(),
            default_value: None,
        };
        assert!(arg.allows("opened"));
        assert!(arg.default_values().is_empty());
    }

    #[test]
    fn default_restricts_allowed_values() {
        let arg = ArgMeta {
            name: "vendor".to_string(),
            default_value: Some("\"gitlab\"".to_string()),
        };
        assert!(arg.allows("gitlab"));
        assert!(!arg.allows("github"));
    }
}
