//! Registry of live cluster owners, keyed by cluster name.

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::event::NamespacedName;
use crate::event::PodEvent;

/// The state machine that owns every pod of one cluster.
///
/// Called from the single dispatcher task: an owner that blocks here stalls
/// routing for every other cluster as well.
pub trait ClusterOwner: Send + Sync {
    fn receive_pod_event(&self, event: PodEvent);
}

/// Shared map from cluster name to owner.
///
/// Lookups take the read lock and never wait on each other, only on a
/// concurrent registration or deregistration.
#[derive(Clone, Default)]
pub struct ClusterRegistry {
    clusters: Arc<RwLock<HashMap<NamespacedName, Arc<dyn ClusterOwner>>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `owner`, returning the owner it replaced, if any.
    pub async fn register(
        &self,
        cluster_name: NamespacedName,
        owner: Arc<dyn ClusterOwner>,
    ) -> Result<Option<Arc<dyn ClusterOwner>>, Report<RegistryError>> {
        if cluster_name.is_empty() {
            return Err(Report::new(RegistryError::EmptyClusterName {
                cluster_name: cluster_name.to_string(),
            }));
        }
        tracing::info!(cluster = %cluster_name, "Registering cluster");
        Ok(self.clusters.write().await.insert(cluster_name, owner))
    }

    pub async fn deregister(&self, cluster_name: &NamespacedName) -> Option<Arc<dyn ClusterOwner>> {
        let removed = self.clusters.write().await.remove(cluster_name);
        if removed.is_some() {
            tracing::info!(cluster = %cluster_name, "Deregistered cluster");
        }
        removed
    }

    /// The lock is released before the handle is returned.
    pub async fn lookup(&self, cluster_name: &NamespacedName) -> Option<Arc<dyn ClusterOwner>> {
        self.clusters.read().await.get(cluster_name).cloned()
    }

    pub async fn contains(&self, cluster_name: &NamespacedName) -> bool {
        self.clusters.read().await.contains_key(cluster_name)
    }

    pub async fn cluster_names(&self) -> Vec<NamespacedName> {
        let mut names: Vec<_> = self.clusters.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.clusters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clusters.read().await.is_empty()
    }
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[derive(Default)]
    struct CountingOwner {
        received: AtomicUsize,
    }

    impl ClusterOwner for CountingOwner {
        fn receive_pod_event(&self, _event: PodEvent) {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test(tokio::test)]
    async fn register_lookup_deregister() {
        let registry = ClusterRegistry::new();
        let name = NamespacedName::new("db", "acid");

        assert!(registry.lookup(&name).await.is_none());

        let previous = registry
            .register(name.clone(), Arc::new(CountingOwner::default()))
            .await
            .expect("should register");
        assert!(previous.is_none());
        assert!(registry.contains(&name).await);
        assert_eq!(registry.cluster_names().await, vec![name.clone()]);

        let replaced = registry
            .register(name.clone(), Arc::new(CountingOwner::default()))
            .await
            .expect("should register again");
        assert!(replaced.is_some());
        assert_eq!(registry.len().await, 1);

        assert!(registry.deregister(&name).await.is_some());
        assert!(registry.deregister(&name).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[test(tokio::test)]
    async fn reject_empty_cluster_name() {
        let registry = ClusterRegistry::new();
        let result = registry
            .register(
                NamespacedName::new("db", ""),
                Arc::new(CountingOwner::default()),
            )
            .await;
        assert!(result.is_err());
        assert!(registry.is_empty().await);
    }

    #[test(tokio::test)]
    async fn concurrent_lookups_share_the_lock() {
        let registry = ClusterRegistry::new();
        let name = NamespacedName::new("db", "acid");
        registry
            .register(name.clone(), Arc::new(CountingOwner::default()))
            .await
            .expect("should register");

        let guard = registry.clusters.read().await;
        // a second reader is admitted while the first guard is alive
        assert!(registry.lookup(&name).await.is_some());
        drop(guard);
    }
}
