//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init telemetry → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Finish in-flight flows →
//!     Drain telemetry queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: server first, telemetry drain last, so spans of
//!   in-flight invocations still reach the sink
//! - Telemetry drain is bounded by a timeout; a stuck sink cannot wedge
//!   process exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
