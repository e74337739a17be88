//! Span tree construction for one simulated invocation.
//!
//! # Responsibilities
//! - Mint trace and span identifiers
//! - Maintain the per-invocation active-span stack with correct parent links
//! - Enforce strictly nested (LIFO) span lifetimes
//! - Hand completed spans to the telemetry sink
//!
//! # Design Decisions
//! - One `TraceContext` per invocation, owned by the engine call; there is no
//!   process-global "current span"
//! - Spans are addressed by `SpanId` while open; closing a non-innermost span
//!   is a nesting fault, not a silent reorder
//! - End timestamps derive from a monotonic clock so `end >= start` holds
//!   even if the wall clock steps backwards

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::telemetry::sink::TelemetrySink;

/// Identifier shared by every span of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TraceId(#[serde(serialize_with = "serialize_uuid")] Uuid);

impl TraceId {
    fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

fn serialize_uuid<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&id.simple())
}

/// Identifier of a single span, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    fn mint() -> Self {
        Self(fastrand::u64(1..))
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Scalar attribute value attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Final outcome recorded on a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Error captured on a span via [`TraceContext::record_exception`].
#[derive(Debug, Clone, Serialize)]
pub struct SpanException {
    /// Error class, e.g. `ValueError`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

/// One timed unit of work within a trace.
///
/// Created by [`TraceContext::start_span`]; ownership moves to the sink when
/// the span closes.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    /// Wall-clock start, nanoseconds since the Unix epoch.
    pub start_unix_nanos: u64,
    /// Wall-clock end; `None` while the span is open.
    pub end_unix_nanos: Option<u64>,
    #[serde(serialize_with = "serialize_attrs")]
    pub attributes: Vec<(String, AttrValue)>,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<SpanException>,
    #[serde(skip)]
    opened_at: Instant,
}

impl Span {
    fn open(trace_id: TraceId, parent: Option<SpanId>, name: &str) -> Self {
        let start_unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            trace_id,
            span_id: SpanId::mint(),
            parent_span_id: parent,
            name: name.to_string(),
            start_unix_nanos,
            end_unix_nanos: None,
            attributes: Vec::new(),
            status: SpanStatus::Ok,
            exception: None,
            opened_at: Instant::now(),
        }
    }

    fn close(&mut self) {
        let elapsed = self.opened_at.elapsed().as_nanos() as u64;
        self.end_unix_nanos = Some(self.start_unix_nanos.saturating_add(elapsed));
    }
}

fn serialize_attrs<S: Serializer>(
    attrs: &[(String, AttrValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(attrs.len()))?;
    for (key, value) in attrs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Faults in span stack usage. These indicate engine bugs, never expected
/// runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A span other than the innermost open one was closed.
    #[error("span {found} closed out of order; innermost open span is {expected}")]
    InvalidSpanNesting { expected: SpanId, found: SpanId },

    /// The addressed span is not open in this trace.
    #[error("span {0} is not open in this trace")]
    SpanNotOpen(SpanId),
}

/// The active-span stack of one invocation.
///
/// Every `start_span` must be paired with an `end_span` on every exit path;
/// [`TraceContext::end_all`] (also run on drop) closes whatever is left so
/// the exported tree is always well-formed.
pub struct TraceContext {
    trace_id: TraceId,
    stack: Vec<Span>,
    sink: Arc<dyn TelemetrySink>,
}

impl TraceContext {
    /// Start a fresh trace. The first `start_span` becomes the root.
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            trace_id: TraceId::mint(),
            stack: Vec::new(),
            sink,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The currently active span, if any.
    pub fn current(&self) -> Option<(TraceId, SpanId)> {
        self.stack.last().map(|s| (self.trace_id, s.span_id))
    }

    /// Number of spans currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a child of the currently active span (or the root span if none
    /// is active) and make it current.
    pub fn start_span(&mut self, name: &str) -> SpanId {
        let parent = self.stack.last().map(|s| s.span_id);
        let span = Span::open(self.trace_id, parent, name);
        let id = span.span_id;
        self.stack.push(span);
        id
    }

    /// Attach a scalar attribute to an open span.
    pub fn set_attribute(
        &mut self,
        span: SpanId,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), TraceError> {
        let entry = (key.to_string(), value.into());
        self.open_mut(span)?.attributes.push(entry);
        Ok(())
    }

    /// Mark an open span as failed without attaching an exception.
    pub fn set_error(&mut self, span: SpanId) -> Result<(), TraceError> {
        self.open_mut(span)?.status = SpanStatus::Error;
        Ok(())
    }

    /// Mark an open span as failed and record the error that caused it.
    pub fn record_exception(
        &mut self,
        span: SpanId,
        kind: &str,
        message: &str,
    ) -> Result<(), TraceError> {
        let target = self.open_mut(span)?;
        target.status = SpanStatus::Error;
        target.exception = Some(SpanException {
            kind: kind.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    /// Close the innermost open span. Closing any other span is a nesting
    /// fault: children must end before their parents.
    pub fn end_span(&mut self, span: SpanId) -> Result<(), TraceError> {
        match self.stack.pop() {
            Some(mut top) if top.span_id == span => {
                top.close();
                self.sink.export_span(top);
                Ok(())
            }
            Some(top) => {
                let expected = top.span_id;
                self.stack.push(top);
                Err(TraceError::InvalidSpanNesting {
                    expected,
                    found: span,
                })
            }
            None => Err(TraceError::SpanNotOpen(span)),
        }
    }

    /// Close every still-open span, innermost first. Used on failure exits
    /// so the root and all ancestors are closed before returning.
    pub fn end_all(&mut self) {
        while let Some(mut span) = self.stack.pop() {
            span.close();
            self.sink.export_span(span);
        }
    }

    fn open_mut(&mut self, span: SpanId) -> Result<&mut Span, TraceError> {
        self.stack
            .iter_mut()
            .find(|s| s.span_id == span)
            .ok_or(TraceError::SpanNotOpen(span))
    }
}

impl Drop for TraceContext {
    fn drop(&mut self) {
        self.end_all();
    }
}
