//! Namespace-scoped list/watch access to pods.

use error_stack::Report;
use error_stack::ResultExt;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ApiResource;
use kube::api::DynamicObject;
use kube::api::ListParams;
use kube::api::WatchEvent;
use kube::api::WatchParams;
use kube::Api;
use kube::Client;

use crate::error::WatchError;

/// Generic list/watch options, before they are scoped to a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub watch: bool,
    pub resource_version: Option<String>,
    pub timeout_seconds: Option<u32>,
}

/// A one-shot list result.
#[derive(Debug, Clone, Default)]
pub struct PodSnapshot {
    pub resource_version: Option<String>,
    pub items: Vec<DynamicObject>,
}

/// Status carried by a watch error event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchStatus {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

/// One notification from a live watch, objects still undecoded.
#[derive(Debug, Clone)]
pub enum RawChange {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
    Bookmark { resource_version: String },
    Error(WatchStatus),
}

pub type RawChangeStream = BoxStream<'static, Result<RawChange, Report<WatchError>>>;

/// The remote side of list/watch.
#[async_trait::async_trait]
pub trait PodSource: Send + Sync {
    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<PodSnapshot, Report<WatchError>>;

    async fn watch(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<RawChangeStream, Report<WatchError>>;
}

/// [`PodSource`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
    resource: ApiResource,
}

impl KubePodSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: ApiResource::erase::<Pod>(&()),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

impl ListOptions {
    fn list_params(&self) -> ListParams {
        ListParams {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            timeout: self.timeout_seconds,
            resource_version: self.resource_version.clone(),
            ..ListParams::default()
        }
    }

    fn watch_params(&self) -> WatchParams {
        WatchParams {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            timeout: self.timeout_seconds,
            bookmarks: true,
            ..WatchParams::default()
        }
    }
}

impl From<WatchEvent<DynamicObject>> for RawChange {
    fn from(event: WatchEvent<DynamicObject>) -> Self {
        match event {
            WatchEvent::Added(obj) => Self::Added(obj),
            WatchEvent::Modified(obj) => Self::Modified(obj),
            WatchEvent::Deleted(obj) => Self::Deleted(obj),
            WatchEvent::Bookmark(bookmark) => Self::Bookmark {
                resource_version: bookmark.metadata.resource_version,
            },
            WatchEvent::Error(e) => Self::Error(WatchStatus {
                code: e.code,
                reason: e.reason,
                message: e.message,
            }),
        }
    }
}

#[async_trait::async_trait]
impl PodSource for KubePodSource {
    async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<PodSnapshot, Report<WatchError>> {
        let list = self
            .api(namespace)
            .list(&options.list_params())
            .await
            .change_context(WatchError::ListFailed {
                namespace: namespace.to_string(),
            })?;

        Ok(PodSnapshot {
            resource_version: list.metadata.resource_version,
            items: list.items,
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<RawChangeStream, Report<WatchError>> {
        // "0" asks the server to start from any version it still has
        let version = options.resource_version.as_deref().unwrap_or("0");
        let stream = self
            .api(namespace)
            .watch(&options.watch_params(), version)
            .await
            .change_context(WatchError::WatchFailed {
                message: format!("failed to open watch in namespace {namespace}"),
            })?;

        Ok(stream
            .map_ok(RawChange::from)
            .map_err(|e| {
                Report::new(e).change_context(WatchError::WatchFailed {
                    message: "watch stream error".to_string(),
                })
            })
            .boxed())
    }
}

/// Scopes list and watch calls to one namespace.
///
/// Caller-supplied selectors are forwarded as given; when the caller leaves a
/// selector unset the adapter's configured default applies. With no defaults
/// configured every pod in the namespace is observed.
pub struct WatchAdapter<S> {
    namespace: String,
    label_selector: Option<String>,
    field_selector: Option<String>,
    source: S,
}

impl<S: PodSource> WatchAdapter<S> {
    pub fn new(namespace: impl Into<String>, source: S) -> Self {
        Self {
            namespace: namespace.into(),
            label_selector: None,
            field_selector: None,
            source,
        }
    }

    pub fn with_selectors(
        mut self,
        label_selector: Option<String>,
        field_selector: Option<String>,
    ) -> Self {
        self.label_selector = label_selector.filter(|s| !s.is_empty());
        self.field_selector = field_selector.filter(|s| !s.is_empty());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn list(&self, options: &ListOptions) -> Result<PodSnapshot, Report<WatchError>> {
        self.source.list(&self.namespace, &self.query(options)).await
    }

    pub async fn watch(&self, options: &ListOptions) -> Result<RawChangeStream, Report<WatchError>> {
        self.source.watch(&self.namespace, &self.query(options)).await
    }

    fn query(&self, options: &ListOptions) -> ListOptions {
        ListOptions {
            label_selector: non_empty(&options.label_selector)
                .or_else(|| self.label_selector.clone()),
            field_selector: non_empty(&options.field_selector)
                .or_else(|| self.field_selector.clone()),
            watch: options.watch,
            resource_version: options.resource_version.clone(),
            timeout_seconds: options.timeout_seconds,
        }
    }
}

fn non_empty(selector: &Option<String>) -> Option<String> {
    selector.clone().filter(|s| !s.is_empty())
}
