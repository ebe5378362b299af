use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::event::PodEvent;
use crate::metrics::RouterMetrics;
use crate::registry::ClusterRegistry;

/// Outcome of routing a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    /// No owner was registered under the event's cluster name.
    Dropped,
}

/// Why the dispatcher loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherExit {
    Cancelled,
    ChannelClosed,
}

/// Sole consumer of the dispatch channel.
///
/// Events leave the channel in the order they were queued and are handed to
/// owners one at a time, so events of one cluster are never reordered.
pub struct PodEventDispatcher {
    registry: ClusterRegistry,
    receiver: mpsc::Receiver<PodEvent>,
    metrics: Arc<RouterMetrics>,
}

impl PodEventDispatcher {
    pub fn new(
        registry: ClusterRegistry,
        receiver: mpsc::Receiver<PodEvent>,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            registry,
            receiver,
            metrics,
        }
    }

    /// Drains the channel until the token fires or every sender is gone.
    ///
    /// Cancellation wins over pending events: once the token has fired no
    /// further owner is called and whatever remains queued is abandoned.
    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, cancellation_token: CancellationToken) -> DispatcherExit {
        info!("Watching all pod events");
        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    info!("Pod event dispatcher shutdown requested");
                    return DispatcherExit::Cancelled;
                }
                event = self.receiver.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatch(event).await;
                        }
                        None => {
                            info!("Pod event channel closed");
                            return DispatcherExit::ChannelClosed;
                        }
                    }
                }
            }
        }
    }

    /// Routes one event to its cluster owner, if the cluster is registered.
    pub async fn dispatch(&self, event: PodEvent) -> Dispatch {
        let Some(owner) = self.registry.lookup(event.cluster_name()).await else {
            debug!(
                event = %event.kind(),
                pod = %event.pod_name(),
                cluster = %event.cluster_name(),
                "No cluster registered for pod event, dropping"
            );
            self.metrics.record_dropped();
            return Dispatch::Dropped;
        };

        debug!(
            "Sending {} event of pod '{}' to the '{}' cluster",
            event.kind(),
            event.pod_name(),
            event.cluster_name()
        );
        owner.receive_pod_event(event);
        self.metrics.record_delivered();
        Dispatch::Delivered
    }
}
