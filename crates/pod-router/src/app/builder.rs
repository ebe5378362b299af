use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::cluster::LoggingClusterOwner;
use crate::config::RunArgs;
use crate::kube_client;
use crate::metrics::RouterMetrics;
use crate::registry::ClusterRegistry;

/// Application builder
pub struct ApplicationBuilder {
    run_args: RunArgs,
}

impl ApplicationBuilder {
    pub fn new(run_args: RunArgs) -> Self {
        Self { run_args }
    }

    /// Connects to Kubernetes and registers the configured clusters.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let client = kube_client::init_kube_client(self.run_args.kubeconfig.as_deref())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let registry = ClusterRegistry::new();
        for cluster_name in &self.run_args.clusters {
            let owner = Arc::new(LoggingClusterOwner::new(cluster_name.clone()));
            registry
                .register(cluster_name.clone(), owner)
                .await
                .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        }
        if registry.is_empty().await {
            tracing::warn!("No clusters registered, every pod event will be dropped");
        }

        Ok(Application::new(
            self.run_args,
            client,
            registry,
            Arc::new(RouterMetrics::new()),
        ))
    }
}
