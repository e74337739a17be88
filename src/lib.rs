//! Instrumented transaction simulator library.
//!
//! Simulates a small shop's request flows and emits the correlated span
//! trees, metrics, and structured logs a real one would, so observability
//! pipelines can be exercised without real dependencies.

pub mod catalog;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod sim;
pub mod telemetry;

pub use catalog::Catalog;
pub use config::SimConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use sim::{FlowKind, FlowOutcome, RequestParams, TransactionEngine, TransactionResult};
pub use telemetry::{ServiceIdentity, TelemetryContext};
