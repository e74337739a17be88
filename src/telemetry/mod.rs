//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! TransactionEngine
//!     → span.rs    (per-invocation span stacks)
//!     → metrics.rs (shared instruments, Prometheus exposition)
//!     → logger.rs  (trace-correlated structured logs)
//!
//! All three hand finished signals to:
//!     → sink.rs    (bounded buffer → stdout JSON lines / discard)
//! ```
//!
//! # Design Decisions
//! - One `TelemetryContext` is built at startup and passed explicitly to
//!   everything that emits; no ambient provider singletons
//! - Span state is per-invocation, metric state is process-wide, and the
//!   sink boundary never blocks or fails a transaction

pub mod logger;
pub mod metrics;
pub mod sink;
pub mod span;

use std::sync::Arc;

use logger::CorrelatedLogger;
use metrics::MetricsRegistry;
use sink::TelemetrySink;
use span::TraceContext;

/// Identity stamped onto every trace this process emits.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
}

impl ServiceIdentity {
    pub fn new(service_name: &str, service_version: &str, environment: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            environment: environment.to_string(),
        }
    }
}

/// Process-wide telemetry bundle: sink, instruments, and logger, built once
/// during startup and shared by reference.
pub struct TelemetryContext {
    pub service: ServiceIdentity,
    pub sink: Arc<dyn TelemetrySink>,
    pub metrics: MetricsRegistry,
    pub logger: CorrelatedLogger,
}

impl TelemetryContext {
    pub fn new(service: ServiceIdentity, sink: Arc<dyn TelemetrySink>) -> Self {
        let metrics = MetricsRegistry::new(sink.clone());
        let logger = CorrelatedLogger::new(&service.service_name, sink.clone());
        Self {
            service,
            sink,
            metrics,
            logger,
        }
    }

    /// Open a fresh trace for one invocation.
    pub fn start_trace(&self) -> TraceContext {
        TraceContext::new(self.sink.clone())
    }
}
