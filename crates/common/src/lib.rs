//! Shared building blocks for the Rampart crates.
//!
//! - [`ids`]: type-safe identifiers carried through logs and engine sessions
//! - [`logging`]: `tracing` subscriber bootstrap for binaries and tests

pub mod ids;
pub mod logging;

pub use ids::TransactionId;
pub use logging::{init_logging, LogFormat};
