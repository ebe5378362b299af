use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::error::WatchError;

/// Builds a client from `kubeconfig`, or from the in-cluster / default
/// configuration when no path is given.
pub async fn init_kube_client(kubeconfig: Option<&Path>) -> Result<Client, Report<WatchError>> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .change_context(WatchError::ConnectionFailed {
                message: "Failed to create Kubernetes client".to_string(),
            });
    };

    tracing::debug!(kubeconfig = %path.display(), "Loading kubeconfig");
    let kubeconfig = Kubeconfig::read_from(path).change_context(WatchError::ConnectionFailed {
        message: format!("Failed to read kubeconfig file: {}", path.display()),
    })?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(WatchError::ConnectionFailed {
            message: format!(
                "Failed to create config from kubeconfig: {}",
                path.display()
            ),
        })?;

    Client::try_from(config).change_context(WatchError::ConnectionFailed {
        message: "Failed to create Kubernetes client from custom kubeconfig".to_string(),
    })
}
