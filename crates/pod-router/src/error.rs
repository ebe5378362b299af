use core::error::Error;

/// Errors that can occur while talking to the pod list/watch API.
#[derive(Debug, derive_more::Display)]
pub enum WatchError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to list pods in namespace {namespace}")]
    ListFailed { namespace: String },
    #[display("Failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[display("Resource version {resource_version} is too old")]
    Expired { resource_version: String },
}

impl Error for WatchError {}

/// Errors raised while handing a normalized event to the dispatcher.
#[derive(Debug, derive_more::Display)]
pub enum NormalizeError {
    #[display("Dispatch channel is closed")]
    ChannelClosed,
}

impl Error for NormalizeError {}

#[derive(Debug, derive_more::Display)]
pub enum RegistryError {
    #[display("Cluster name must not be empty: {cluster_name}")]
    EmptyClusterName { cluster_name: String },
}

impl Error for RegistryError {}
