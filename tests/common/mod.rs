//! Shared utilities for integration testing.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shopsim::catalog::Catalog;
use shopsim::config::{ExporterKind, SimConfig, SimulationConfig};
use shopsim::sim::rng::RandomnessSource;
use shopsim::sim::SimRng;
use shopsim::telemetry::logger::LogRecord;
use shopsim::telemetry::metrics::LabelSet;
use shopsim::telemetry::sink::{NullSink, TelemetrySink};
use shopsim::telemetry::span::{Span, TraceId};
use shopsim::{HttpServer, ServiceIdentity, Shutdown, TelemetryContext, TransactionEngine};

/// Captures every exported signal for assertions.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    pub spans: Mutex<Vec<Span>>,
    pub metrics: Mutex<Vec<(String, f64, LabelSet)>>,
    pub logs: Mutex<Vec<LogRecord>>,
}

#[allow(dead_code)]
impl RecordingSink {
    /// Span names in export order.
    pub fn span_names(&self) -> Vec<String> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// All exported spans belonging to one trace, in export order.
    pub fn spans_for(&self, trace_id: TraceId) -> Vec<Span> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Number of measurements exported for one instrument + label set.
    pub fn metric_count(&self, name: &str, labels: &LabelSet) -> usize {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, l)| n == name && l == labels)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn export_span(&self, span: Span) {
        self.spans.lock().unwrap().push(span);
    }

    fn export_metric(&self, name: &str, value: f64, labels: &LabelSet) {
        self.metrics
            .lock()
            .unwrap()
            .push((name.to_string(), value, labels.clone()));
    }

    fn export_log(&self, record: LogRecord) {
        self.logs.lock().unwrap().push(record);
    }
}

/// Randomness source replaying scripted failure outcomes.
///
/// Delays collapse to their lower bound and everything else delegates to a
/// fixed-seed PRNG, so a test controls exactly the decision it cares about.
#[allow(dead_code)]
pub struct ScriptedRng {
    fails: Mutex<VecDeque<bool>>,
    fallback: SimRng,
}

#[allow(dead_code)]
impl ScriptedRng {
    pub fn failing_with(outcomes: &[bool]) -> Self {
        Self {
            fails: Mutex::new(outcomes.iter().copied().collect()),
            fallback: SimRng::with_seed(0),
        }
    }
}

impl RandomnessSource for ScriptedRng {
    fn delay(&self, min: Duration, _max: Duration) -> Duration {
        min
    }

    fn fails(&self, _probability: f64) -> bool {
        self.fails.lock().unwrap().pop_front().unwrap_or(false)
    }

    fn int_in(&self, min: i64, max: i64) -> i64 {
        self.fallback.int_in(min, max)
    }

    fn index(&self, len: usize) -> usize {
        self.fallback.index(len)
    }

    fn sample_indices(&self, len: usize, k: usize) -> Vec<usize> {
        self.fallback.sample_indices(len, k)
    }
}

/// Engine wired to the given sink and randomness, with default settings.
#[allow(dead_code)]
pub fn engine_with(
    sink: Arc<RecordingSink>,
    rng: Arc<dyn RandomnessSource>,
) -> (TransactionEngine, Arc<TelemetryContext>) {
    let telemetry = Arc::new(TelemetryContext::new(
        ServiceIdentity::new("shopsim-test", "0.0.0", "test"),
        sink,
    ));
    let engine = TransactionEngine::new(
        telemetry.clone(),
        Arc::new(Catalog::builtin()),
        rng,
        SimulationConfig::default(),
    );
    (engine, telemetry)
}

/// Engine with a seeded PRNG, for reproducible scenarios.
#[allow(dead_code)]
pub fn seeded_engine(
    sink: Arc<RecordingSink>,
    seed: u64,
) -> (TransactionEngine, Arc<TelemetryContext>) {
    engine_with(sink, Arc::new(SimRng::with_seed(seed)))
}

/// Bind an ephemeral port, start a full server on it, and return its
/// address plus the shutdown handle.
#[allow(dead_code)]
pub async fn spawn_server() -> (SocketAddr, Shutdown) {
    let mut config = SimConfig::default();
    config.telemetry.exporter = ExporterKind::None;
    config.telemetry.metrics_enabled = false;

    let telemetry = Arc::new(TelemetryContext::new(
        ServiceIdentity::new("shopsim-test", "0.0.0", "test"),
        Arc::new(NullSink),
    ));
    let engine = Arc::new(TransactionEngine::new(
        telemetry,
        Arc::new(Catalog::builtin()),
        Arc::new(SimRng::new()),
        config.simulation.clone(),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = HttpServer::new(config, engine);
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    (addr, shutdown)
}
