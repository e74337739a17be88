//! HTTP dispatch subsystem (the Invoker).
//!
//! # Data Flow
//! ```text
//! incoming request
//!     → server.rs (Axum setup, middleware, request ID)
//!     → route handler picks the matching flow kind
//!     → TransactionEngine runs the flow
//!     → outcome mapped to status code + JSON payload + x-trace-id header
//! ```

pub mod server;

pub use server::HttpServer;
