use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::dispatcher::PodEventDispatcher;
use crate::event::PodEvent;
use crate::informer::PodInformer;
use crate::metrics;
use crate::normalizer::PodEventNormalizer;
use crate::watch::KubePodSource;
use crate::watch::WatchAdapter;

/// Delay before a failed informer relists.
const INFORMER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let capacity = app.run_args().channel_capacity as usize;
        let (event_sender, event_receiver) = mpsc::channel::<PodEvent>(capacity);

        let informer_task = self.spawn_informer_task(app, event_sender);
        self.tasks.push(informer_task);

        let dispatcher_task = self.spawn_dispatcher_task(app, event_receiver);
        self.tasks.push(dispatcher_task);

        let metrics_task = self.spawn_metrics_task(app);
        self.tasks.push(metrics_task);
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
            }
            result = futures::future::select_all(self.tasks.iter_mut()) => {
                let (result, index, remaining) = result;
                drop(remaining);
                // a finished JoinHandle must not be awaited again
                self.tasks.remove(index);
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    self.shutdown().await;
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly, shutting down");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        // the informer stops with the token and drops its sender, so no
        // producer is left waiting on a dispatcher that has already exited
        self.cancellation_token.cancel();
        self.wait_for_tasks_with_timeout(Duration::from_secs(30))
            .await;
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_informer_task(
        &self,
        app: &Application,
        event_sender: mpsc::Sender<PodEvent>,
    ) -> JoinHandle<()> {
        let args = app.run_args();
        let adapter = WatchAdapter::new(&args.namespace, KubePodSource::new(app.client().clone()))
            .with_selectors(args.label_selector.clone(), args.field_selector.clone());
        let normalizer = PodEventNormalizer::new(
            args.cluster_name_label.clone(),
            event_sender,
            app.metrics().clone(),
        );
        let mut informer =
            PodInformer::new(adapter, normalizer).with_watch_timeout(args.watch_timeout_secs);
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting pod informer task");
            loop {
                match informer.run(token.clone()).await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!("Pod informer failed: {e:?}");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(INFORMER_RETRY_DELAY) => {}
                        }
                    }
                }
            }
            tracing::info!(known_pods = informer.known_pods(), "Pod informer task completed");
        })
    }

    fn spawn_dispatcher_task(
        &self,
        app: &Application,
        event_receiver: mpsc::Receiver<PodEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = PodEventDispatcher::new(
            app.registry().clone(),
            event_receiver,
            app.metrics().clone(),
        );
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting pod event dispatcher task");
            let exit = dispatcher.run(token).await;
            tracing::info!(?exit, "Pod event dispatcher task completed");
        })
    }

    fn spawn_metrics_task(&self, app: &Application) -> JoinHandle<()> {
        let args = app.run_args();
        let metrics = app.metrics().clone();
        let interval = Duration::from_secs(args.metrics_interval_secs.max(1));
        let format = args.metrics_format;
        let tags = BTreeMap::from([("namespace".to_string(), args.namespace.clone())]);
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting metrics reporting task");
            metrics::run_metrics(metrics, interval, format, tags, token).await;
            tracing::info!("Metrics reporting task completed");
        })
    }
}
