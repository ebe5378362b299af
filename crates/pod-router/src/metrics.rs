//! Routing counters and their periodic report.
//!
//! Drops never surface as errors, so these counters are the only place where
//! lost events become visible.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use influxdb_line_protocol::LineProtocolBuilder;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::event::EventKind;

/// Measurement name used for both output formats.
pub const MEASUREMENT: &str = "pod_router";

#[derive(Debug, Default)]
pub struct RouterMetrics {
    add_events: AtomicU64,
    update_events: AtomicU64,
    delete_events: AtomicU64,
    payloads_ignored: AtomicU64,
    delivered: AtomicU64,
    dropped_unknown_cluster: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub add_events: u64,
    pub update_events: u64,
    pub delete_events: u64,
    pub payloads_ignored: u64,
    pub delivered: u64,
    pub dropped_unknown_cluster: u64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::Add => &self.add_events,
            EventKind::Update => &self.update_events,
            EventKind::Delete => &self.delete_events,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.payloads_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_unknown_cluster.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            add_events: self.add_events.load(Ordering::Relaxed),
            update_events: self.update_events.load(Ordering::Relaxed),
            delete_events: self.delete_events.load(Ordering::Relaxed),
            payloads_ignored: self.payloads_ignored.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_unknown_cluster: self.dropped_unknown_cluster.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    fn fields(&self) -> [(&'static str, u64); 6] {
        [
            ("add_events", self.add_events),
            ("update_events", self.update_events),
            ("delete_events", self.delete_events),
            ("payloads_ignored", self.payloads_ignored),
            ("delivered", self.delivered),
            ("dropped_unknown_cluster", self.dropped_unknown_cluster),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MetricsFormat {
    #[default]
    Influx,
    Json,
}

/// Encodes one snapshot as a single line, without trailing newline.
pub fn encode(
    format: MetricsFormat,
    snapshot: &MetricsSnapshot,
    tags: &BTreeMap<String, String>,
    timestamp: i64,
) -> String {
    match format {
        MetricsFormat::Influx => encode_influx(snapshot, tags, timestamp),
        MetricsFormat::Json => encode_json(snapshot, tags, timestamp),
    }
}

fn encode_influx(
    snapshot: &MetricsSnapshot,
    tags: &BTreeMap<String, String>,
    timestamp: i64,
) -> String {
    let mut builder = LineProtocolBuilder::new().measurement(MEASUREMENT);
    for (key, value) in tags {
        builder = builder.tag(key, value);
    }

    // the builder changes type after the first field
    let [first, rest @ ..] = snapshot.fields();
    let mut line = builder.field(first.0, first.1);
    for (key, value) in rest {
        line = line.field(key, value);
    }
    let bytes = line.timestamp(timestamp).close_line().build();
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

fn encode_json(
    snapshot: &MetricsSnapshot,
    tags: &BTreeMap<String, String>,
    timestamp: i64,
) -> String {
    serde_json::json!({
        "measurement": MEASUREMENT,
        "tags": tags,
        "fields": snapshot,
        "timestamp": timestamp,
    })
    .to_string()
}

pub fn current_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

/// Periodically writes a metrics line on the `metrics` tracing target.
pub async fn run_metrics(
    metrics: Arc<RouterMetrics>,
    interval: Duration,
    format: MetricsFormat,
    tags: BTreeMap<String, String>,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                tracing::info!("Metrics reporting shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let line = encode(format, &metrics.snapshot(), &tags, current_time());
                tracing::info!(target: "metrics", msg = %line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn sample() -> MetricsSnapshot {
        let metrics = RouterMetrics::new();
        metrics.record_enqueued(EventKind::Add);
        metrics.record_enqueued(EventKind::Add);
        metrics.record_enqueued(EventKind::Delete);
        metrics.record_ignored();
        metrics.record_delivered();
        metrics.record_dropped();
        metrics.snapshot()
    }

    #[test]
    fn counters_accumulate() {
        assert_eq!(
            sample(),
            MetricsSnapshot {
                add_events: 2,
                update_events: 0,
                delete_events: 1,
                payloads_ignored: 1,
                delivered: 1,
                dropped_unknown_cluster: 1,
            }
        );
    }

    #[test]
    fn encode_influx_line() {
        let tags = BTreeMap::from([("namespace".to_string(), "db".to_string())]);
        let line = encode(MetricsFormat::Influx, &sample(), &tags, 1000);
        assert_eq!(
            line,
            "pod_router,namespace=db add_events=2u,update_events=0u,delete_events=1u,\
             payloads_ignored=1u,delivered=1u,dropped_unknown_cluster=1u 1000"
        );
    }

    #[test]
    fn encode_json_line() {
        let line = encode(MetricsFormat::Json, &sample(), &BTreeMap::new(), 5);
        let value: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(value["measurement"], "pod_router");
        assert_eq!(value["fields"]["delivered"], 1);
        assert_eq!(value["timestamp"], 5);
    }
}
