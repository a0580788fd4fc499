//! Observability for the sweeper: structured logging and Prometheus metrics.
//!
//! Logging is always available. Metrics recording compiles to no-ops unless
//! the `prometheus` feature is enabled.

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
