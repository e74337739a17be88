//! Structured logging correlated with the active trace.
//!
//! # Responsibilities
//! - Build immutable log records carrying caller-supplied fields
//! - Stamp records with the trace/span ids of the invocation's active span
//! - Hand records to the telemetry sink and mirror them to the console
//!
//! # Design Decisions
//! - Correlation comes from the invocation's `TraceContext`, passed
//!   explicitly; the logger holds no span state of its own
//! - Emission is infallible from the caller's view; a slow or unavailable
//!   sink is absorbed at the sink boundary, never here

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::telemetry::sink::TelemetrySink;
use crate::telemetry::span::{SpanId, TraceContext, TraceId};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One emitted log record. Immutable once built; ownership moves to the
/// sink on emission.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,
    /// Wall-clock emission time, nanoseconds since the Unix epoch.
    pub unix_nanos: u64,
}

/// Logger stamping every record with the caller's active span identifiers.
pub struct CorrelatedLogger {
    service: String,
    sink: Arc<dyn TelemetrySink>,
}

impl CorrelatedLogger {
    pub fn new(service: &str, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            service: service.to_string(),
            sink,
        }
    }

    /// Emit one record. When `trace` has an active span, its identifiers are
    /// merged into the record; otherwise the record goes out uncorrelated.
    pub fn log(
        &self,
        trace: Option<&TraceContext>,
        level: LogLevel,
        message: &str,
        fields: &[(&str, Value)],
    ) {
        let (trace_id, span_id) = match trace.and_then(TraceContext::current) {
            Some((t, s)) => (Some(t), Some(s)),
            None => (None, None),
        };
        let record = LogRecord {
            level,
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            trace_id,
            span_id,
            unix_nanos: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
        };
        self.mirror(&record);
        self.sink.export_log(record);
    }

    pub fn debug(&self, trace: Option<&TraceContext>, message: &str, fields: &[(&str, Value)]) {
        self.log(trace, LogLevel::Debug, message, fields);
    }

    pub fn info(&self, trace: Option<&TraceContext>, message: &str, fields: &[(&str, Value)]) {
        self.log(trace, LogLevel::Info, message, fields);
    }

    pub fn warn(&self, trace: Option<&TraceContext>, message: &str, fields: &[(&str, Value)]) {
        self.log(trace, LogLevel::Warn, message, fields);
    }

    pub fn error(&self, trace: Option<&TraceContext>, message: &str, fields: &[(&str, Value)]) {
        self.log(trace, LogLevel::Error, message, fields);
    }

    /// Mirror the record through `tracing` so console output carries the
    /// same identifiers as the exported stream.
    fn mirror(&self, record: &LogRecord) {
        let trace_id = record.trace_id.map(|t| t.to_string());
        let trace_id = trace_id.as_deref().unwrap_or("-");
        let span_id = record.span_id.map(|s| s.to_string());
        let span_id = span_id.as_deref().unwrap_or("-");
        let fields = if record.fields.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.fields).unwrap_or_default()
        };
        let fields = fields.as_str();
        match record.level {
            LogLevel::Debug => tracing::debug!(
                service = %self.service, trace_id, span_id, fields, "{}", record.message
            ),
            LogLevel::Info => tracing::info!(
                service = %self.service, trace_id, span_id, fields, "{}", record.message
            ),
            LogLevel::Warn => tracing::warn!(
                service = %self.service, trace_id, span_id, fields, "{}", record.message
            ),
            LogLevel::Error => tracing::error!(
                service = %self.service, trace_id, span_id, fields, "{}", record.message
            ),
        }
    }
}
