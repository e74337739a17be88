//! Transaction simulation subsystem.
//!
//! # Data Flow
//! ```text
//! flow kind + request params
//!     → engine.rs (step sequencing, span tree, outcome)
//!     → rng.rs    (delays, failure rolls, item selection)
//! ```

pub mod engine;
pub mod rng;

pub use engine::{
    EngineError, FlowKind, FlowOutcome, RequestParams, TransactionEngine, TransactionResult,
};
pub use rng::{RandomnessSource, SimRng};
