//! # Gateway Routing
//!
//! Provider routing for the IAFactory LLM gateway.
//!
//! This crate provides:
//! - Model-based provider selection (exact, then longest prefix)
//! - Execution in buffered or streamed mode with first-byte, idle and
//!   request time budgets
//! - A single fallback attempt for fallback-eligible upstream failures

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod router;

// Re-export main types
pub use router::{Execution, ExecutionOutput, Router, RouterConfig, RoutingDecision};
