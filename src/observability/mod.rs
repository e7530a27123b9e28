//! # Observability Infrastructure
//!
//! Structured logging setup and metrics recording for the client runtime.

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{describe_metrics, MetricsRecorder};
