//! provides logging helpers

use std::fmt;
use std::path::Path;

use anyhow::Context;
use tracing::field::Field;
use tracing::field::Visit;
use tracing::Event;
use tracing::Metadata;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter;
use tracing_subscriber::fmt::format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Target that routes an event to the metrics sink instead of the log.
pub const METRICS_TARGET: &str = "metrics";

/// Writes nothing but the recorded field values, one event per line.
struct LineFormatter;

#[derive(Default)]
struct FieldVisitor {
    msg: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, _: &Field, value: &str) {
        self.msg.push_str(value);
    }

    fn record_debug(&mut self, _: &Field, value: &dyn fmt::Debug) {
        self.msg.push_str(&format!("{value:?}"));
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        writeln!(writer, "{}", visitor.msg)
    }
}

fn is_metrics(metadata: &Metadata<'_>) -> bool {
    metadata.target() == METRICS_TARGET
}

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// initiate the global tracing subscriber
///
/// Regular logs go to stderr, filtered by `RUST_LOG`. Events on the
/// [`METRICS_TARGET`] target are written as bare lines: to a daily rolling
/// file when `metrics_file` is set, to stderr otherwise. The returned guard
/// must be held for as long as metrics are written to the file.
pub fn init(metrics_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter().and(filter::filter_fn(|metadata| !is_metrics(metadata))));

    let Some(metrics_file) = metrics_file else {
        let metrics_layer = layer()
            .event_format(LineFormatter)
            .fmt_fields(format::DefaultFields::new())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_filter(filter::filter_fn(is_metrics));

        registry()
            .with(fmt_layer)
            .with(metrics_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(None);
    };

    let path = metrics_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = metrics_file
        .file_name()
        .and_then(|f| f.to_str())
        .with_context(|| format!("invalid metrics file name: {}", metrics_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file)
        .max_log_files(3)
        .build(path)
        .context("failed to create rolling file appender")?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let metrics_layer = layer()
        .event_format(LineFormatter)
        .fmt_fields(format::DefaultFields::new())
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(filter::filter_fn(is_metrics));

    registry()
        .with(fmt_layer)
        .with(metrics_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(Some(file_guard))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;

    use similar_asserts::assert_eq;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn metrics_layer_writes_bare_lines() {
        let buffer = Buffer::default();
        let metrics_layer = layer()
            .event_format(LineFormatter)
            .fmt_fields(format::DefaultFields::new())
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_filter(filter::filter_fn(is_metrics));
        let subscriber = registry().with(metrics_layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "metrics", msg = %"pod_router add_events=1i 1");
            tracing::info!("not a metric");
        });

        let written = String::from_utf8(buffer.0.lock().expect("lock").clone()).expect("utf8");
        assert_eq!(written, "pod_router add_events=1i 1\n");
    }
}
