use std::path::PathBuf;

use clap::Parser;

use crate::event::NamespacedName;
use crate::informer::DEFAULT_WATCH_TIMEOUT_SECS;
use crate::metrics::MetricsFormat;
use crate::normalizer::DEFAULT_CLUSTER_NAME_LABEL;

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(
        long,
        env = "POD_ROUTER_NAMESPACE",
        default_value = "default",
        help = "Namespace whose pods are watched"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "POD_ROUTER_CLUSTER_NAME_LABEL",
        default_value = DEFAULT_CLUSTER_NAME_LABEL,
        help = "Pod label holding the name of the owning cluster"
    )]
    pub cluster_name_label: String,

    #[arg(
        long,
        help = "Label selector applied when the caller sets none (empty watches every pod)"
    )]
    pub label_selector: Option<String>,

    #[arg(
        long,
        help = "Field selector applied when the caller sets none (empty watches every pod)"
    )]
    pub field_selector: Option<String>,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        default_value = "128",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Capacity of the dispatch channel; a full channel holds back the watcher"
    )]
    pub channel_capacity: u32,

    #[arg(
        long,
        default_value_t = DEFAULT_WATCH_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u32).range(1..295),
        help = "Server-side timeout of a single watch request, in seconds"
    )]
    pub watch_timeout_secs: u32,

    #[arg(
        long = "cluster",
        value_name = "NAMESPACE/NAME",
        help = "Cluster to register with a logging owner, may be repeated"
    )]
    pub clusters: Vec<NamespacedName>,

    #[arg(
        long,
        env = "POD_ROUTER_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Path for routing metrics, e.g. /logs/metrics.log"
    )]
    pub metrics_file: Option<PathBuf>,

    #[arg(
        long,
        default_value = "10",
        help = "Seconds between two metrics lines"
    )]
    pub metrics_interval_secs: u64,

    #[arg(long, value_enum, default_value_t = MetricsFormat::Influx)]
    pub metrics_format: MetricsFormat,
}
