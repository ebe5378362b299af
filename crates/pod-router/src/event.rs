//! Normalized pod lifecycle events.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A `namespace/name` pair identifying a pod or a cluster.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// A name without its object part cannot address anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Parses `namespace/name`. A bare `name` lands in the `default` namespace.
impl std::str::FromStr for NamespacedName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = match s.split_once('/') {
            Some((namespace, name)) => (namespace, name),
            None => ("default", s),
        };
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(format!("invalid namespaced name '{s}', expected namespace/name"));
        }
        Ok(Self::new(namespace, name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum EventKind {
    #[display("ADD")]
    Add,
    #[display("UPDATE")]
    Update,
    #[display("DELETE")]
    Delete,
}

/// One pod notification, routed to the cluster named in `cluster_name`.
///
/// Records are immutable: the owning cluster is resolved once when the record
/// is built and travels with it unchanged.
#[derive(Debug, Clone)]
pub struct PodEvent {
    cluster_name: NamespacedName,
    pod_name: NamespacedName,
    kind: EventKind,
    prev_pod: Option<Arc<Pod>>,
    cur_pod: Arc<Pod>,
    resource_version: String,
}

impl PodEvent {
    pub fn added(cluster_name: NamespacedName, pod: Arc<Pod>) -> Self {
        Self::build(cluster_name, EventKind::Add, None, pod)
    }

    pub fn updated(cluster_name: NamespacedName, prev: Arc<Pod>, cur: Arc<Pod>) -> Self {
        Self::build(cluster_name, EventKind::Update, Some(prev), cur)
    }

    /// `last_known` is the final state observed before the pod went away.
    pub fn deleted(cluster_name: NamespacedName, last_known: Arc<Pod>) -> Self {
        Self::build(cluster_name, EventKind::Delete, None, last_known)
    }

    fn build(
        cluster_name: NamespacedName,
        kind: EventKind,
        prev_pod: Option<Arc<Pod>>,
        cur_pod: Arc<Pod>,
    ) -> Self {
        let pod_name = NamespacedName::from_meta(&cur_pod.metadata);
        let resource_version = cur_pod
            .metadata
            .resource_version
            .clone()
            .unwrap_or_default();
        Self {
            cluster_name,
            pod_name,
            kind,
            prev_pod,
            cur_pod,
            resource_version,
        }
    }

    pub fn cluster_name(&self) -> &NamespacedName {
        &self.cluster_name
    }

    pub fn pod_name(&self) -> &NamespacedName {
        &self.pod_name
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn prev_pod(&self) -> Option<&Arc<Pod>> {
        self.prev_pod.as_ref()
    }

    pub fn cur_pod(&self) -> &Arc<Pod> {
        &self.cur_pod
    }

    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn pod(name: &str, resource_version: &str) -> Arc<Pod> {
        Arc::new(Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("db".to_string()),
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn update_carries_both_states() {
        let cluster = NamespacedName::new("db", "acid");
        let event = PodEvent::updated(cluster.clone(), pod("p1", "10"), pod("p1", "11"));

        assert_eq!(event.kind(), EventKind::Update);
        assert_eq!(event.cluster_name(), &cluster);
        assert_eq!(event.pod_name().to_string(), "db/p1");
        assert_eq!(event.resource_version(), "11");
        assert_eq!(
            event
                .prev_pod()
                .and_then(|p| p.metadata.resource_version.as_deref()),
            Some("10")
        );
    }

    #[test]
    fn add_and_delete_have_no_previous_state() {
        let cluster = NamespacedName::new("db", "acid");
        assert!(PodEvent::added(cluster.clone(), pod("p1", "1"))
            .prev_pod()
            .is_none());
        let deleted = PodEvent::deleted(cluster, pod("p1", "7"));
        assert!(deleted.prev_pod().is_none());
        assert_eq!(deleted.kind().to_string(), "DELETE");
        assert_eq!(deleted.resource_version(), "7");
    }

    #[test]
    fn parse_namespaced_name() {
        assert_eq!(
            "db/acid".parse::<NamespacedName>(),
            Ok(NamespacedName::new("db", "acid"))
        );
        assert_eq!(
            "acid".parse::<NamespacedName>(),
            Ok(NamespacedName::new("default", "acid"))
        );
        assert!("db/".parse::<NamespacedName>().is_err());
        assert!("a/b/c".parse::<NamespacedName>().is_err());
    }
}
