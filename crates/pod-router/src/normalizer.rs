use std::sync::Arc;

use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::NormalizeError;
use crate::event::EventKind;
use crate::event::NamespacedName;
use crate::event::PodEvent;
use crate::metrics::RouterMetrics;
use crate::raw::RawObject;

/// Label that names the cluster a pod belongs to, unless configured otherwise.
pub const DEFAULT_CLUSTER_NAME_LABEL: &str = "cluster-name";

/// Resolves the owning cluster from the pod's namespace and cluster label.
///
/// The name part is empty when the label is missing.
pub fn cluster_name_for(pod: &Pod, cluster_name_label: &str) -> NamespacedName {
    let name = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(cluster_name_label))
        .cloned()
        .unwrap_or_default();
    NamespacedName {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name,
    }
}

/// Turns raw add/update/delete notifications into [`PodEvent`]s and queues
/// them for the dispatcher.
///
/// Sends wait for room on the bounded channel, so a slow dispatcher pushes
/// back on whoever drives the normalizer.
#[derive(Debug, Clone)]
pub struct PodEventNormalizer {
    cluster_name_label: String,
    sender: mpsc::Sender<PodEvent>,
    metrics: Arc<RouterMetrics>,
}

impl PodEventNormalizer {
    pub fn new(
        cluster_name_label: impl Into<String>,
        sender: mpsc::Sender<PodEvent>,
        metrics: Arc<RouterMetrics>,
    ) -> Self {
        Self {
            cluster_name_label: cluster_name_label.into(),
            sender,
            metrics,
        }
    }

    pub async fn on_add(&self, raw: &RawObject) -> Result<(), Report<NormalizeError>> {
        let Some(pod) = self.expect_pod(raw, EventKind::Add) else {
            return Ok(());
        };
        let cluster_name = cluster_name_for(pod, &self.cluster_name_label);
        self.enqueue(PodEvent::added(cluster_name, pod.clone()))
            .await
    }

    pub async fn on_update(
        &self,
        prev: &RawObject,
        cur: &RawObject,
    ) -> Result<(), Report<NormalizeError>> {
        let Some(prev_pod) = self.expect_pod(prev, EventKind::Update) else {
            return Ok(());
        };
        let Some(cur_pod) = self.expect_pod(cur, EventKind::Update) else {
            return Ok(());
        };
        let cluster_name = cluster_name_for(cur_pod, &self.cluster_name_label);
        self.enqueue(PodEvent::updated(
            cluster_name,
            prev_pod.clone(),
            cur_pod.clone(),
        ))
        .await
    }

    pub async fn on_delete(&self, raw: &RawObject) -> Result<(), Report<NormalizeError>> {
        let Some(pod) = self.expect_pod(raw, EventKind::Delete) else {
            return Ok(());
        };
        let cluster_name = cluster_name_for(pod, &self.cluster_name_label);
        self.enqueue(PodEvent::deleted(cluster_name, pod.clone()))
            .await
    }

    fn expect_pod<'a>(&self, raw: &'a RawObject, kind: EventKind) -> Option<&'a Arc<Pod>> {
        match raw {
            RawObject::Pod(pod) => Some(pod),
            RawObject::Foreign {
                kind: object_kind,
                reason,
            } => {
                debug!(
                    event = %kind,
                    kind = %object_kind,
                    reason = %reason,
                    "Ignoring non-pod payload"
                );
                self.metrics.record_ignored();
                None
            }
        }
    }

    async fn enqueue(&self, event: PodEvent) -> Result<(), Report<NormalizeError>> {
        let kind = event.kind();
        self.sender
            .send(event)
            .await
            .map_err(|e| {
                Report::new(NormalizeError::ChannelClosed).attach_printable(format!(
                    "dropped {kind} event of pod {}",
                    e.0.pod_name()
                ))
            })?;
        self.metrics.record_enqueued(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    fn pod(name: &str, cluster: Option<&str>, resource_version: &str) -> Pod {
        let labels = cluster
            .map(|c| BTreeMap::from([(DEFAULT_CLUSTER_NAME_LABEL.to_string(), c.to_string())]));
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("db".to_string()),
                labels,
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn foreign() -> RawObject {
        RawObject::Foreign {
            kind: "ConfigMap".to_string(),
            reason: "expected kind Pod".to_string(),
        }
    }

    fn normalizer(
        capacity: usize,
    ) -> (
        PodEventNormalizer,
        mpsc::Receiver<PodEvent>,
        Arc<RouterMetrics>,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        let metrics = Arc::new(RouterMetrics::new());
        (
            PodEventNormalizer::new(DEFAULT_CLUSTER_NAME_LABEL, tx, metrics.clone()),
            rx,
            metrics,
        )
    }

    #[test]
    fn cluster_name_from_label() {
        let resolved = cluster_name_for(&pod("p1", Some("acid"), "1"), DEFAULT_CLUSTER_NAME_LABEL);
        assert_eq!(resolved, NamespacedName::new("db", "acid"));
        assert_eq!(
            cluster_name_for(&pod("p1", Some("acid"), "1"), DEFAULT_CLUSTER_NAME_LABEL),
            resolved
        );

        let unlabeled = cluster_name_for(&pod("p1", None, "1"), DEFAULT_CLUSTER_NAME_LABEL);
        assert!(unlabeled.is_empty());

        let other_label = cluster_name_for(&pod("p1", Some("acid"), "1"), "application");
        assert!(other_label.is_empty());
    }

    #[test(tokio::test)]
    async fn add_produces_one_record() {
        let (normalizer, mut rx, metrics) = normalizer(4);

        normalizer
            .on_add(&pod("p1", Some("acid"), "1").into())
            .await
            .expect("should enqueue");

        let event = rx.try_recv().expect("one record");
        assert_eq!(event.kind(), EventKind::Add);
        assert_eq!(event.cluster_name(), &NamespacedName::new("db", "acid"));
        assert_eq!(event.pod_name(), &NamespacedName::new("db", "p1"));
        assert!(event.prev_pod().is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().add_events, 1);
    }

    #[test(tokio::test)]
    async fn update_uses_current_pod_for_routing() {
        let (normalizer, mut rx, _) = normalizer(4);

        normalizer
            .on_update(
                &pod("p1", Some("old"), "1").into(),
                &pod("p1", Some("acid"), "2").into(),
            )
            .await
            .expect("should enqueue");

        let event = rx.try_recv().expect("one record");
        assert_eq!(event.kind(), EventKind::Update);
        assert_eq!(event.cluster_name().name, "acid");
        assert_eq!(event.resource_version(), "2");
        assert_eq!(
            event
                .prev_pod()
                .and_then(|p| p.metadata.resource_version.clone()),
            Some("1".to_string())
        );
    }

    #[test(tokio::test)]
    async fn delete_carries_last_known_state() {
        let (normalizer, mut rx, _) = normalizer(4);

        normalizer
            .on_delete(&pod("p1", Some("acid"), "9").into())
            .await
            .expect("should enqueue");

        let event = rx.try_recv().expect("one record");
        assert_eq!(event.kind(), EventKind::Delete);
        assert_eq!(event.resource_version(), "9");
    }

    #[test(tokio::test)]
    async fn foreign_payloads_are_ignored() {
        let (normalizer, mut rx, metrics) = normalizer(4);
        let good: RawObject = pod("p1", Some("acid"), "1").into();

        normalizer.on_add(&foreign()).await.expect("no error");
        normalizer.on_update(&foreign(), &good).await.expect("no error");
        normalizer.on_update(&good, &foreign()).await.expect("no error");
        normalizer.on_delete(&foreign()).await.expect("no error");

        assert!(rx.try_recv().is_err());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.payloads_ignored, 4);
        assert_eq!(snapshot.add_events + snapshot.update_events + snapshot.delete_events, 0);
    }

    #[test(tokio::test)]
    async fn full_channel_holds_back_the_producer() {
        let (normalizer, mut rx, _) = normalizer(1);
        normalizer
            .on_add(&pod("p1", Some("acid"), "1").into())
            .await
            .expect("first record fits");

        let blocked = tokio::spawn({
            let normalizer = normalizer.clone();
            async move {
                normalizer
                    .on_add(&pod("p2", Some("acid"), "2").into())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        let first = rx.recv().await.expect("first record");
        assert_eq!(first.pod_name().name, "p1");

        blocked
            .await
            .expect("producer task")
            .expect("second record enqueued once a slot is free");
        let second = rx.recv().await.expect("second record");
        assert_eq!(second.pod_name().name, "p2");
        assert!(rx.try_recv().is_err());
    }

    #[test(tokio::test)]
    async fn closed_channel_is_reported() {
        let (normalizer, rx, _) = normalizer(1);
        drop(rx);

        let result = normalizer.on_add(&pod("p1", Some("acid"), "1").into()).await;
        assert!(matches!(
            result.map_err(|e| e.current_context().to_string()),
            Err(msg) if msg == "Dispatch channel is closed"
        ));
    }
}
