//! Telemetry sink boundary.
//!
//! # Data Flow
//! ```text
//! engine / registry / logger
//!     → TelemetrySink (trait)
//!         → BufferedSink (bounded queue, drop on overflow)
//!             → StdoutSink (JSON lines)  |  NullSink (discard)
//! ```
//!
//! # Design Decisions
//! - Handoff never blocks an invocation: the buffered sink uses `try_send`
//!   and counts what it sheds when the collector side falls behind
//! - Sink trouble degrades observability only; nothing here returns an
//!   error to the caller

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::telemetry::logger::LogRecord;
use crate::telemetry::metrics::LabelSet;
use crate::telemetry::span::Span;

/// Destination for completed spans, metric measurements, and log records.
pub trait TelemetrySink: Send + Sync {
    fn export_span(&self, span: Span);
    fn export_metric(&self, name: &str, value: f64, labels: &LabelSet);
    fn export_log(&self, record: LogRecord);
}

/// One exported signal, tagged for line-oriented consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "signal", rename_all = "lowercase")]
pub enum TelemetryEvent {
    Span(Span),
    Metric {
        name: String,
        value: f64,
        labels: LabelSet,
    },
    Log(LogRecord),
}

/// Writes one JSON line per signal to stdout.
pub struct StdoutSink;

impl StdoutSink {
    fn write(&self, event: &TelemetryEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            let _ = writeln!(handle, "{line}");
        }
    }
}

impl TelemetrySink for StdoutSink {
    fn export_span(&self, span: Span) {
        self.write(&TelemetryEvent::Span(span));
    }

    fn export_metric(&self, name: &str, value: f64, labels: &LabelSet) {
        self.write(&TelemetryEvent::Metric {
            name: name.to_string(),
            value,
            labels: labels.clone(),
        });
    }

    fn export_log(&self, record: LogRecord) {
        self.write(&TelemetryEvent::Log(record));
    }
}

/// Discards every signal. Used when export is disabled.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn export_span(&self, _: Span) {}

    fn export_metric(&self, _: &str, _: f64, _: &LabelSet) {}

    fn export_log(&self, _: LogRecord) {}
}

/// Bounded queue in front of another sink.
///
/// Producers enqueue without waiting; a drain task forwards to the inner
/// sink. When the queue is full the event is dropped and counted.
pub struct BufferedSink {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: AtomicU64,
}

impl BufferedSink {
    /// Start the drain worker and return the sink plus the worker handle.
    ///
    /// The worker exits once every sender clone is gone and the queue has
    /// drained, so awaiting the handle at shutdown flushes pending signals.
    pub fn spawn(
        inner: Arc<dyn TelemetrySink>,
        capacity: usize,
    ) -> (Arc<BufferedSink>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                deliver(inner.as_ref(), event);
            }
        });
        (Arc::new(Self::new(tx)), worker)
    }

    fn new(tx: mpsc::Sender<TelemetryEvent>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of signals shed because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, event: TelemetryEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl TelemetrySink for BufferedSink {
    fn export_span(&self, span: Span) {
        self.enqueue(TelemetryEvent::Span(span));
    }

    fn export_metric(&self, name: &str, value: f64, labels: &LabelSet) {
        self.enqueue(TelemetryEvent::Metric {
            name: name.to_string(),
            value,
            labels: labels.clone(),
        });
    }

    fn export_log(&self, record: LogRecord) {
        self.enqueue(TelemetryEvent::Log(record));
    }
}

fn deliver(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    match event {
        TelemetryEvent::Span(span) => sink.export_span(span),
        TelemetryEvent::Metric {
            name,
            value,
            labels,
        } => sink.export_metric(&name, value, &labels),
        TelemetryEvent::Log(record) => sink.export_log(record),
    }
}
