//! Routes pod lifecycle events to the cluster that owns each pod.
//!
//! Data flows one way:
//!
//! ```text
//! PodSource -> WatchAdapter -> PodInformer -> PodEventNormalizer
//!           -> dispatch channel -> PodEventDispatcher -> ClusterRegistry -> ClusterOwner
//! ```
//!
//! Many producers may feed the channel; exactly one dispatcher drains it, so
//! events of a cluster reach its owner in the order they were queued.

pub mod app;
pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod informer;
pub mod kube_client;
pub mod metrics;
pub mod normalizer;
pub mod raw;
pub mod registry;
pub mod watch;

pub use cluster::LoggingClusterOwner;
pub use cluster::PodSubscription;
pub use cluster::SubscribingCluster;
pub use dispatcher::Dispatch;
pub use dispatcher::DispatcherExit;
pub use dispatcher::PodEventDispatcher;
pub use event::EventKind;
pub use event::NamespacedName;
pub use event::PodEvent;
pub use informer::PodInformer;
pub use normalizer::PodEventNormalizer;
pub use raw::RawObject;
pub use registry::ClusterOwner;
pub use registry::ClusterRegistry;
pub use watch::ListOptions;
pub use watch::PodSource;
pub use watch::WatchAdapter;
