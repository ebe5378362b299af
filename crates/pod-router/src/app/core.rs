use std::sync::Arc;

use anyhow::Result;
use kube::Client;

use crate::app::tasks::Tasks;
use crate::config::RunArgs;
use crate::metrics::RouterMetrics;
use crate::registry::ClusterRegistry;

/// Application core structure with explicit dependencies
pub struct Application {
    run_args: RunArgs,
    client: Client,
    registry: ClusterRegistry,
    metrics: Arc<RouterMetrics>,
}

impl Application {
    pub fn new(
        run_args: RunArgs,
        client: Client,
        registry: ClusterRegistry,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            run_args,
            client,
            registry,
            metrics,
        }
    }

    pub fn run_args(&self) -> &RunArgs {
        &self.run_args
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Registry handle; registering and deregistering clusters is up to the caller.
    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    /// Run application, start all tasks and wait for completion
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting all application tasks...");

        let mut tasks = Tasks::new();
        tasks.spawn_all_tasks(self);

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!(metrics = ?self.metrics.snapshot(), "Application run completed");
        Ok(())
    }
}
