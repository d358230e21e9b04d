//! Pipeline claim/completion endpoints

use reqwest::StatusCode;

use pocketci_core::domain::pipeline::PipelineRun;
use pocketci_core::dto::ClaimRequest;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Claim the next eligible pipeline run for `runner_name`.
    ///
    /// Returns `None` when the queue has nothing for this runner (the
    /// control plane answers 204). A returned run is removed from the queue
    /// and must be completed with [`pipeline_done`](Self::pipeline_done)
    /// whether execution succeeds or fails.
    pub async fn claim_pipeline(&self, runner_name: &str) -> Result<Option<PipelineRun>> {
        let url = format!("{}/pipelines/claim", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ClaimRequest {
                runner_name: runner_name.to_string(),
            })
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }

    /// Mark a pipeline run as done.
    ///
    /// Unknown ids surface as an `ApiError` with status 404; callers log and
    /// move on.
    pub async fn pipeline_done(&self, id: i64) -> Result<()> {
        let url = format!("{}/pipelines/{id}", self.base_url);
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
