//! Runner configuration

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
///
/// Intervals and parallelism are tunable so the same binary fits both a
/// beefy dedicated host and a small sidecar.
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator control plane
    pub control_plane: String,

    /// Name identifying this runner; pipelines pinned to a runner name only
    /// execute on a runner carrying it
    pub runner_name: String,

    /// How often to poll for claimable pipelines
    pub poll_interval: Duration,

    /// Max pipelines executing concurrently
    pub parallelism: usize,

    /// Base directory for per-pipeline workspaces
    pub workspace_base: PathBuf,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.control_plane.is_empty() {
            anyhow::bail!("control-plane must be specified and be a valid url");
        }

        if !self.control_plane.starts_with("http://") && !self.control_plane.starts_with("https://")
        {
            anyhow::bail!("control-plane must start with http:// or https://");
        }

        if self.runner_name.is_empty() {
            anyhow::bail!("runner-name must be specified");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("interval must be greater than 0");
        }

        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be greater than 0");
        }

        Ok(())
    }
}
