//! Repository configuration (`pocketci.yaml`)

use serde::Deserialize;

/// Default location of the CI module inside a user repository.
pub const DEFAULT_MODULE_PATH: &str = "./ci";

/// Parsed `pocketci.yaml` from the repository root.
///
/// The file is optional; a missing or empty file yields the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Spec {
    #[serde(rename = "module-path")]
    pub module_path: String,
    pub secrets: Vec<Secret>,
}

/// A secret forwarded into pipeline invocations, resolved from the
/// orchestrator's (or runner's) environment at execution time.
#[derive(Debug, Clone, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(rename = "from-env")]
    pub from_env: String,
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            module_path: DEFAULT_MODULE_PATH.to_string(),
            secrets: Vec::new(),
        }
    }
}

impl Spec {
    /// Parses a `pocketci.yaml` document. `None` means the file was absent,
    /// which is not an error.
    pub fn parse(contents: Option<&str>) -> Result<Self, serde_yaml::Error> {
        match contents {
            None => Ok(Self::default()),
            Some(raw) if raw.trim().is_empty() => Ok(Self::default()),
            Some(raw) => {
                let mut spec: Spec = serde_yaml::from_str(raw)?;
                if spec.module_path.is_empty() {
                    spec.module_path = DEFAULT_MODULE_PATH.to_string();
                }
                Ok(spec)
            }
        }
    }
}
