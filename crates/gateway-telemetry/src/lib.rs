//! # Gateway Telemetry
//!
//! Observability for the IAFactory LLM gateway.
//!
//! This crate provides:
//! - Structured logging (pretty or JSON) via `tracing-subscriber`
//! - Prometheus metrics for requests, tokens, credit resolutions and fallbacks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsError};
