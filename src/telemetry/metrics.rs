//! Metric instruments and exposition.
//!
//! # Responsibilities
//! - Provide named counter / histogram / up-down instruments, created on
//!   first use and reused for the process lifetime
//! - Aggregate measurements per label set without lost updates
//! - Expose everything to Prometheus via the `metrics` facade
//! - Forward every measurement to the telemetry sink for correlation
//!
//! # Design Decisions
//! - Instruments are never deleted; lookup by name is idempotent
//! - Counter and up-down cells are atomics behind a concurrent map, so
//!   concurrent `add` calls take no exclusive lock
//! - The Prometheus exporter owns bucketing; the in-process histogram keeps
//!   count and sum, which is what the tests and the sink need

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::telemetry::sink::TelemetrySink;

/// An ordered set of metric dimensions, e.g. `{endpoint, method}`.
///
/// Keys are kept sorted so two sets with the same pairs compare and hash
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a dimension, replacing any existing value for the same key.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.0.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Ok(i) => self.0[i].1 = value,
            Err(i) => self.0.insert(i, (key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| self.0[i].1.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn facade_labels(&self) -> Vec<Label> {
        self.0
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect()
    }
}

impl Serialize for LabelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Monotonic counter. Deltas are non-negative by construction (`u64`).
pub struct Counter {
    name: String,
    sink: Arc<dyn TelemetrySink>,
    cells: DashMap<LabelSet, AtomicU64>,
}

impl Counter {
    fn new(name: &str, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            name: name.to_string(),
            sink,
            cells: DashMap::new(),
        }
    }

    pub fn add(&self, delta: u64, labels: &LabelSet) {
        self.cells
            .entry(labels.clone())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
        metrics::counter!(self.name.clone(), labels.facade_labels()).increment(delta);
        self.sink.export_metric(&self.name, delta as f64, labels);
    }

    /// Current value for one label combination.
    pub fn value(&self, labels: &LabelSet) -> u64 {
        self.cells
            .get(labels)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Distribution of non-negative observations (durations, amounts).
pub struct Histogram {
    name: String,
    sink: Arc<dyn TelemetrySink>,
    cells: DashMap<LabelSet, HistogramCell>,
}

#[derive(Debug, Default, Clone, Copy)]
struct HistogramCell {
    count: u64,
    sum: f64,
}

impl Histogram {
    fn new(name: &str, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            name: name.to_string(),
            sink,
            cells: DashMap::new(),
        }
    }

    pub fn record(&self, value: f64, labels: &LabelSet) {
        {
            let mut cell = self.cells.entry(labels.clone()).or_default();
            cell.count += 1;
            cell.sum += value;
        }
        metrics::histogram!(self.name.clone(), labels.facade_labels()).record(value);
        self.sink.export_metric(&self.name, value, labels);
    }

    /// Number of observations recorded for one label combination.
    pub fn count(&self, labels: &LabelSet) -> u64 {
        self.cells.get(labels).map(|c| c.count).unwrap_or(0)
    }

    /// Sum of observations recorded for one label combination.
    pub fn sum(&self, labels: &LabelSet) -> f64 {
        self.cells.get(labels).map(|c| c.sum).unwrap_or(0.0)
    }
}

/// Gauge-like counter accepting signed deltas.
pub struct UpDownCounter {
    name: String,
    sink: Arc<dyn TelemetrySink>,
    cells: DashMap<LabelSet, AtomicI64>,
}

impl UpDownCounter {
    fn new(name: &str, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            name: name.to_string(),
            sink,
            cells: DashMap::new(),
        }
    }

    pub fn add(&self, delta: i64, labels: &LabelSet) {
        self.cells
            .entry(labels.clone())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
        let gauge = metrics::gauge!(self.name.clone(), labels.facade_labels());
        if delta >= 0 {
            gauge.increment(delta as f64);
        } else {
            gauge.decrement(-delta as f64);
        }
        self.sink.export_metric(&self.name, delta as f64, labels);
    }

    pub fn value(&self, labels: &LabelSet) -> i64 {
        self.cells
            .get(labels)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Process-wide instrument registry.
///
/// Shared by all in-flight invocations; lookups return the same instrument
/// for the same name.
pub struct MetricsRegistry {
    sink: Arc<dyn TelemetrySink>,
    counters: DashMap<String, Arc<Counter>>,
    histograms: DashMap<String, Arc<Histogram>>,
    up_down_counters: DashMap<String, Arc<UpDownCounter>>,
}

impl MetricsRegistry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            counters: DashMap::new(),
            histograms: DashMap::new(),
            up_down_counters: DashMap::new(),
        }
    }

    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(name, self.sink.clone())))
            .clone()
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(name, self.sink.clone())))
            .clone()
    }

    pub fn up_down_counter(&self, name: &str) -> Arc<UpDownCounter> {
        self.up_down_counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(UpDownCounter::new(name, self.sink.clone())))
            .clone()
    }
}

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Exporter failure degrades exposition only; the process keeps running.
pub fn init_prometheus(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sink::NullSink;
    use std::sync::Mutex;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(Arc::new(NullSink))
    }

    #[test]
    fn label_set_order_is_canonical() {
        let a = LabelSet::empty()
            .with("endpoint", "/api/products")
            .with("method", "GET");
        let b = LabelSet::empty()
            .with("method", "GET")
            .with("endpoint", "/api/products");
        assert_eq!(a, b);
        assert_eq!(a.get("method"), Some("GET"));
        assert_eq!(a.get("missing"), None);
    }

    #[test]
    fn instrument_lookup_is_idempotent() {
        let reg = registry();
        let a = reg.counter("app.request.count");
        let b = reg.counter("app.request.count");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn counter_sums_deltas_per_label_set() {
        let reg = registry();
        let counter = reg.counter("app.request.count");
        let products = LabelSet::empty().with("endpoint", "/api/products");
        let users = LabelSet::empty().with("endpoint", "/api/users");
        counter.add(1, &products);
        counter.add(2, &products);
        counter.add(5, &users);
        assert_eq!(counter.value(&products), 3);
        assert_eq!(counter.value(&users), 5);
    }

    #[test]
    fn concurrent_counter_adds_are_lossless() {
        let reg = Arc::new(registry());
        let counter = reg.counter("app.orders.total");
        let labels = LabelSet::empty().with("status", "completed");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            let labels = labels.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    counter.add(1, &labels);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.value(&labels), 8000);
    }

    #[test]
    fn up_down_counter_accepts_signed_deltas() {
        let reg = registry();
        let gauge = reg.up_down_counter("app.users.active");
        let labels = LabelSet::empty();
        gauge.add(2, &labels);
        gauge.add(-1, &labels);
        gauge.add(-3, &labels);
        assert_eq!(gauge.value(&labels), -2);
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let reg = registry();
        let hist = reg.histogram("app.request.duration");
        let labels = LabelSet::empty().with("endpoint", "/api/checkout");
        hist.record(10.0, &labels);
        hist.record(32.5, &labels);
        assert_eq!(hist.count(&labels), 2);
        assert!((hist.sum(&labels) - 42.5).abs() < 1e-9);
        assert_eq!(hist.count(&LabelSet::empty()), 0);
    }

    #[test]
    fn measurements_reach_the_sink() {
        struct MetricCapture(Mutex<Vec<(String, f64)>>);

        impl TelemetrySink for MetricCapture {
            fn export_span(&self, _: crate::telemetry::span::Span) {}

            fn export_metric(&self, name: &str, value: f64, _: &LabelSet) {
                self.0.lock().unwrap().push((name.to_string(), value));
            }

            fn export_log(&self, _: crate::telemetry::logger::LogRecord) {}
        }

        let capture = Arc::new(MetricCapture(Mutex::new(Vec::new())));
        let reg = MetricsRegistry::new(capture.clone());
        reg.counter("c").add(1, &LabelSet::empty());
        reg.histogram("h").record(7.5, &LabelSet::empty());

        let seen = capture.0.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("c".to_string(), 1.0), ("h".to_string(), 7.5)]);
    }
}
