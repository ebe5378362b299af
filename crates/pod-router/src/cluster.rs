//! Cluster owners that can be registered with the dispatcher.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use crate::event::EventKind;
use crate::event::NamespacedName;
use crate::event::PodEvent;
use crate::registry::ClusterOwner;

/// Fans pod events out to whoever subscribed to that pod.
///
/// Events for pods without a subscriber are discarded. Forwarding goes through
/// unbounded channels so the dispatcher never waits on a subscriber.
pub struct SubscribingCluster {
    name: NamespacedName,
    pod_subscribers: RwLock<HashMap<NamespacedName, mpsc::UnboundedSender<PodEvent>>>,
}

impl SubscribingCluster {
    pub fn new(name: NamespacedName) -> Self {
        Self {
            name,
            pod_subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &NamespacedName {
        &self.name
    }

    /// Subscribes to events of `pod_name`, replacing any earlier subscriber.
    pub fn subscribe(&self, pod_name: NamespacedName) -> PodSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self
            .pod_subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if subscribers.insert(pod_name.clone(), tx).is_some() {
            warn!(cluster = %self.name, pod = %pod_name, "Replacing existing pod subscriber");
        }
        PodSubscription {
            pod_name,
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, pod_name: &NamespacedName) -> bool {
        self.pod_subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(pod_name)
            .is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.pod_subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl ClusterOwner for SubscribingCluster {
    fn receive_pod_event(&self, event: PodEvent) {
        let subscriber = self
            .pod_subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(event.pod_name())
            .cloned();

        if let Some(subscriber) = subscriber {
            let pod_name = event.pod_name().clone();
            if subscriber.send(event).is_err() {
                // receiver went away without unsubscribing
                self.unsubscribe(&pod_name);
            }
        }
    }
}

/// Receiving end of [`SubscribingCluster::subscribe`].
#[derive(Debug)]
pub struct PodSubscription {
    pod_name: NamespacedName,
    receiver: mpsc::UnboundedReceiver<PodEvent>,
}

impl PodSubscription {
    pub fn pod_name(&self) -> &NamespacedName {
        &self.pod_name
    }

    pub async fn recv(&mut self) -> Option<PodEvent> {
        self.receiver.recv().await
    }

    /// Waits for the first event accepted by `predicate`, skipping the rest.
    ///
    /// Returns `None` on timeout or when the cluster dropped the subscription.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut predicate: F) -> Option<PodEvent>
    where
        F: FnMut(&PodEvent) -> bool,
    {
        tokio::time::timeout(timeout, async {
            while let Some(event) = self.receiver.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Waits until the pod carries `key=value` among its labels.
    pub async fn wait_for_label(
        &mut self,
        key: &str,
        value: &str,
        timeout: Duration,
    ) -> Option<PodEvent> {
        self.wait_for(timeout, |event| {
            event
                .cur_pod()
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(key))
                .is_some_and(|v| v == value)
        })
        .await
    }

    pub async fn wait_for_deletion(&mut self, timeout: Duration) -> Option<PodEvent> {
        self.wait_for(timeout, |event| event.kind() == EventKind::Delete)
            .await
    }
}

/// Owner that only reports what it receives.
#[derive(Debug)]
pub struct LoggingClusterOwner {
    name: NamespacedName,
}

impl LoggingClusterOwner {
    pub fn new(name: NamespacedName) -> Self {
        Self { name }
    }
}

impl ClusterOwner for LoggingClusterOwner {
    fn receive_pod_event(&self, event: PodEvent) {
        let phase = event
            .cur_pod()
            .status
            .as_ref()
            .and_then(|status| status.phase.clone())
            .unwrap_or_default();
        info!(
            cluster = %self.name,
            pod = %event.pod_name(),
            event = %event.kind(),
            resource_version = %event.resource_version(),
            phase = %phase,
            "Received pod event"
        );
    }
}
