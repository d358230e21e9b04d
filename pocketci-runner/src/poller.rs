//! Pipeline poller
//!
//! Polls the control plane for claimable pipeline runs and executes them.
//! Parallelism is bounded by a semaphore whose permit is taken *before*
//! claiming: a claim removes the run from the orchestrator's queue, so a
//! run must never be claimed without a slot to execute it in.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use pocketci_client::OrchestratorClient;
use pocketci_core::domain::pipeline::PipelineRun;

use crate::config::Config;
use crate::execution::Executor;

/// Poller that continuously claims and executes pipeline runs.
pub struct PipelinePoller {
    config: Config,
    client: Arc<OrchestratorClient>,
    executor: Arc<Executor>,
    semaphore: Arc<Semaphore>,
}

impl PipelinePoller {
    pub fn new(config: Config, client: Arc<OrchestratorClient>, executor: Arc<Executor>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.parallelism));
        Self {
            config,
            client,
            executor,
            semaphore,
        }
    }

    /// Runs the polling loop forever.
    pub async fn run(&self) {
        info!(
            "starting pipeline poller (interval: {:?}, parallelism: {})",
            self.config.poll_interval, self.config.parallelism
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                continue;
            };

            match self.client.claim_pipeline(&self.config.runner_name).await {
                Ok(Some(run)) => self.spawn_run(run, permit),
                Ok(None) => {
                    debug!("no pipeline to run");
                }
                Err(err) => {
                    error!("failed to claim pipeline: {err}");
                }
            }
        }
    }

    /// Executes a claimed run in its own task, reporting completion whether
    /// the build succeeded or failed.
    fn spawn_run(&self, run: PipelineRun, permit: OwnedSemaphorePermit) {
        let client = Arc::clone(&self.client);
        let executor = Arc::clone(&self.executor);

        tokio::spawn(async move {
            let _permit = permit;

            info!("executing pipeline {} ({})", run.name, run.id);
            if let Err(err) = executor.run(&run).await {
                error!("pipeline {} ({}) failed: {err:#}", run.name, run.id);
            }

            match client.pipeline_done(run.id).await {
                Ok(()) => info!("pipeline {} is done", run.id),
                Err(err) if err.is_not_found() => {
                    warn!("pipeline {} is unknown to the control plane", run.id);
                }
                Err(err) => error!("could not mark pipeline {} as done: {err}", run.id),
            }
        });
    }
}
