//! # Gateway Providers
//!
//! Upstream provider transports for the IAFactory LLM gateway.
//!
//! Every supported backend (Groq, OpenRouter, DeepSeek, OpenAI, ...) speaks
//! the OpenAI chat-completions dialect, so one transport implementation
//! serves all of them. Providers are described by
//! [`gateway_core::ProviderProfile`] and collected in an immutable
//! [`ProviderRegistry`].
//!
//! The `testing` feature exposes [`testing::ScriptedTransport`], a
//! transport double driven by per-provider scripts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod openai_compat;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use openai_compat::{map_status_error, OpenAICompatTransport};
pub use registry::{profile_from_settings, ProviderEntry, ProviderRegistry, ProviderRegistryBuilder};
