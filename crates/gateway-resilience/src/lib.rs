//! # Gateway Resilience
//!
//! Resilience patterns for the IAFactory LLM gateway:
//! - Deadlines for upstream exchanges and an inter-chunk idle timeout
//! - Fixed-window per-caller rate limiting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod rate_limit;
pub mod timeout;

// Re-export main types
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use timeout::{idle_timeout, with_deadline};
