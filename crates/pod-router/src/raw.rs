//! Raw objects as delivered by the list/watch API.
//!
//! The adapter hands out [`DynamicObject`]s; [`RawObject::decode`] turns each
//! one into either a typed [`Pod`] or an explicit [`RawObject::Foreign`]
//! variant so that the normalizer never has to guess the payload's shape.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::Resource;
use kube::api::DynamicObject;

#[derive(Debug, Clone)]
pub enum RawObject {
    Pod(Arc<Pod>),
    /// Anything that did not decode as a pod.
    Foreign { kind: String, reason: String },
}

impl RawObject {
    /// Decodes a dynamic object as a pod.
    ///
    /// Items of a list response usually carry no type information, so a
    /// missing `kind` is decoded optimistically; a present but different kind
    /// is rejected without attempting to parse.
    pub fn decode(obj: DynamicObject) -> Self {
        let kind = obj.types.as_ref().map(|t| t.kind.clone());
        if let Some(kind) = kind.as_deref() {
            if kind != Pod::KIND {
                return Self::Foreign {
                    kind: kind.to_string(),
                    reason: format!("expected kind {}", Pod::KIND),
                };
            }
        }

        let decoded = serde_json::to_value(&obj).and_then(serde_json::from_value::<Pod>);
        match decoded {
            Ok(pod) => Self::Pod(Arc::new(pod)),
            Err(e) => Self::Foreign {
                kind: kind.unwrap_or_else(|| "<unknown>".to_string()),
                reason: e.to_string(),
            },
        }
    }

    pub fn as_pod(&self) -> Option<&Arc<Pod>> {
        match self {
            Self::Pod(pod) => Some(pod),
            Self::Foreign { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Pod(_) => Pod::KIND,
            Self::Foreign { kind, .. } => kind,
        }
    }
}

impl From<Pod> for RawObject {
    fn from(pod: Pod) -> Self {
        Self::Pod(Arc::new(pod))
    }
}

impl From<Arc<Pod>> for RawObject {
    fn from(pod: Arc<Pod>) -> Self {
        Self::Pod(pod)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;

    pub(crate) fn dynamic<K: serde::Serialize>(obj: &K) -> DynamicObject {
        serde_json::from_value(serde_json::to_value(obj).expect("serialize"))
            .expect("dynamic object")
    }

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("db".to_string()),
                labels: Some(BTreeMap::from([(
                    "cluster-name".to_string(),
                    "acid".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-1".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn decode_pod() {
        let raw = RawObject::decode(dynamic(&pod("p1")));
        let decoded = raw.as_pod().expect("should decode as pod");
        assert_eq!(decoded.metadata.name.as_deref(), Some("p1"));
        assert_eq!(
            decoded.spec.as_ref().and_then(|s| s.node_name.as_deref()),
            Some("node-1")
        );
    }

    #[test]
    fn decode_untyped_list_item() {
        let mut obj = dynamic(&pod("p1"));
        obj.types = None;
        assert!(RawObject::decode(obj).as_pod().is_some());
    }

    #[test]
    fn reject_other_kinds() {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let raw = RawObject::decode(dynamic(&config_map));
        assert!(raw.as_pod().is_none());
        assert_eq!(raw.kind(), "ConfigMap");
    }
}
