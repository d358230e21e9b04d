//! Data transfer objects for the control-plane API

use serde::{Deserialize, Serialize};

/// Payload a runner sends when it wants to claim a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub runner_name: String,
}
