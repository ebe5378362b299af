//! Drives list + watch and feeds the normalizer.
//!
//! The informer remembers the last state it saw for every pod. That memory is
//! what turns a bare "this pod now looks like X" notification into an add or
//! an update with its previous state, and what lets a relist notice pods that
//! disappeared while no watch was open.

use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::error::NormalizeError;
use crate::error::WatchError;
use crate::event::NamespacedName;
use crate::normalizer::PodEventNormalizer;
use crate::raw::RawObject;
use crate::watch::ListOptions;
use crate::watch::PodSource;
use crate::watch::RawChange;
use crate::watch::WatchAdapter;

/// Server-side watch timeout; kube rejects anything from 295 seconds up.
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

pub struct PodInformer<S> {
    adapter: WatchAdapter<S>,
    normalizer: PodEventNormalizer,
    /// Last decoded state per pod; payloads that fail to decode never land here.
    store: HashMap<NamespacedName, Arc<Pod>>,
    resource_version: Option<String>,
    watch_timeout_secs: u32,
}

impl<S: PodSource> PodInformer<S> {
    pub fn new(adapter: WatchAdapter<S>, normalizer: PodEventNormalizer) -> Self {
        Self {
            adapter,
            normalizer,
            store: HashMap::new(),
            resource_version: None,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }

    pub fn with_watch_timeout(mut self, seconds: u32) -> Self {
        self.watch_timeout_secs = seconds;
        self
    }

    /// Number of pods currently known.
    pub fn known_pods(&self) -> usize {
        self.store.len()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    /// Lists, then watches until cancelled.
    ///
    /// Returns `Ok(())` on cancellation or once the dispatcher has gone away.
    /// Remote failures are returned as-is; the informer keeps its store, so
    /// calling `run` again after an error relists and reconciles.
    #[tracing::instrument(skip_all, fields(namespace = %self.adapter.namespace()))]
    pub async fn run(
        &mut self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<WatchError>> {
        info!("Starting pod informer");
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                info!("Pod informer shutdown requested");
                Ok(())
            }
            result = self.list_and_watch() => result,
        }
    }

    async fn list_and_watch(&mut self) -> Result<(), Report<WatchError>> {
        if self.relist().await?.is_break() {
            return Ok(());
        }
        loop {
            if self.watch_once().await?.is_break() {
                return Ok(());
            }
            debug!(resource_version = ?self.resource_version, "Watch closed by server, reopening");
        }
    }

    /// Replaces the store with a fresh snapshot, emitting the difference.
    async fn relist(&mut self) -> Result<ControlFlow<()>, Report<WatchError>> {
        let snapshot = self.adapter.list(&ListOptions::default()).await?;
        debug!(
            pods = snapshot.items.len(),
            resource_version = ?snapshot.resource_version,
            "Listed pods"
        );

        let mut seen = HashSet::with_capacity(snapshot.items.len());
        for obj in snapshot.items {
            let key = object_key(&obj);
            seen.insert(key.clone());
            if self.upsert(key, RawObject::decode(obj)).await.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        let vanished: Vec<NamespacedName> = self
            .store
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in vanished {
            if let Some(last_known) = self.store.remove(&key) {
                let result = self.normalizer.on_delete(&RawObject::Pod(last_known)).await;
                if closed(result).is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
        }

        self.resource_version = snapshot.resource_version;
        Ok(ControlFlow::Continue(()))
    }

    /// Consumes one watch until the server closes it.
    async fn watch_once(&mut self) -> Result<ControlFlow<()>, Report<WatchError>> {
        let options = ListOptions {
            watch: true,
            resource_version: self.resource_version.clone(),
            timeout_seconds: Some(self.watch_timeout_secs),
            ..ListOptions::default()
        };
        let mut stream = self.adapter.watch(&options).await?;

        while let Some(change) = stream.next().await {
            let flow = match change? {
                RawChange::Added(obj) | RawChange::Modified(obj) => {
                    self.advance(&obj);
                    let key = object_key(&obj);
                    self.upsert(key, RawObject::decode(obj)).await
                }
                RawChange::Deleted(obj) => {
                    self.advance(&obj);
                    let last_known = self.store.remove(&object_key(&obj));
                    let raw = match (RawObject::decode(obj), last_known) {
                        (RawObject::Foreign { .. }, Some(pod)) => RawObject::Pod(pod),
                        (raw, _) => raw,
                    };
                    closed(self.normalizer.on_delete(&raw).await)
                }
                RawChange::Bookmark { resource_version } => {
                    self.resource_version = Some(resource_version);
                    ControlFlow::Continue(())
                }
                RawChange::Error(status) if status.code == 410 => {
                    return Err(Report::new(WatchError::Expired {
                        resource_version: self.resource_version.clone().unwrap_or_default(),
                    })
                    .attach_printable(status.message));
                }
                RawChange::Error(status) => {
                    return Err(Report::new(WatchError::WatchFailed {
                        message: format!("{} ({}): {}", status.reason, status.code, status.message),
                    }));
                }
            };
            if flow.is_break() {
                return Ok(flow);
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Emits an add for an unknown pod and an update for a known one.
    ///
    /// An undecodable payload still goes to the normalizer, which drops it,
    /// but leaves the stored state untouched.
    async fn upsert(&mut self, key: NamespacedName, raw: RawObject) -> ControlFlow<()> {
        let prev = match &raw {
            RawObject::Pod(pod) => self.store.insert(key, pod.clone()),
            RawObject::Foreign { .. } => self.store.get(&key).cloned(),
        };
        let result = match prev {
            Some(prev) => self.normalizer.on_update(&RawObject::Pod(prev), &raw).await,
            None => self.normalizer.on_add(&raw).await,
        };
        closed(result)
    }

    fn advance(&mut self, obj: &DynamicObject) {
        if let Some(version) = &obj.metadata.resource_version {
            self.resource_version = Some(version.clone());
        }
    }
}

fn object_key(obj: &DynamicObject) -> NamespacedName {
    NamespacedName::from_meta(&obj.metadata)
}

fn closed(result: Result<(), Report<NormalizeError>>) -> ControlFlow<()> {
    match result {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) => {
            info!("Stopping pod informer: {e}");
            ControlFlow::Break(())
        }
    }
}
