//! Provider profiles and the uniform transport interface.
//!
//! The router never branches on provider identity: every upstream is a
//! [`ProviderProfile`] (static description) paired with a
//! [`ProviderTransport`] (the capability set `complete` + `stream`).

use crate::error::GatewayError;
use crate::request::ChatCompletionRequest;
use crate::response::CompletionResult;
use crate::streaming::CompletionChunk;
use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Finite, single-pass stream of completion chunks paced by the upstream
pub type ChunkStream = BoxStream<'static, Result<CompletionChunk, GatewayError>>;

/// Credits charged per 1,000 tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pricing {
    /// Credits per 1,000 tokens
    pub per_1k_tokens: u64,
}

impl Pricing {
    /// Create pricing from a per-1k-tokens rate
    #[must_use]
    pub const fn per_1k_tokens(per_1k_tokens: u64) -> Self {
        Self { per_1k_tokens }
    }

    /// Cost of `tokens` tokens, rounded up to a whole credit
    #[must_use]
    pub fn cost(&self, tokens: u64) -> u64 {
        tokens.saturating_mul(self.per_1k_tokens).div_ceil(1_000)
    }
}

/// How strongly a profile matches a requested model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelMatch {
    /// Model name starts with one of the profile's prefixes (prefix length)
    Prefix(usize),
    /// Model is listed verbatim by the profile
    Exact,
}

/// Static description of an upstream provider
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Provider ID (also a routing prefix)
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Price per token unit
    pub pricing: Pricing,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_ref: Option<String>,
    /// Resolved API key; `None` means the provider is unavailable
    pub api_key: Option<SecretString>,
    /// Models advertised by this provider
    pub models: Vec<String>,
    /// Additional routing prefixes
    pub prefixes: Vec<String>,
    /// Explicit fallback provider ID
    pub fallback: Option<String>,
}

impl ProviderProfile {
    /// Create a new profile
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, pricing: Pricing) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            pricing,
            base_url: base_url.into(),
            api_key_ref: None,
            api_key: None,
            models: Vec::new(),
            prefixes: Vec::new(),
            fallback: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Set the API key environment variable name
    #[must_use]
    pub fn with_api_key_ref(mut self, var: impl Into<String>) -> Self {
        self.api_key_ref = Some(var.into());
        self
    }

    /// Advertise a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    /// Add a routing prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Set the explicit fallback provider
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Whether the provider has the credential it needs
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Match a requested model against this profile
    #[must_use]
    pub fn match_model(&self, model: &str) -> Option<ModelMatch> {
        if self.models.iter().any(|m| m == model) {
            return Some(ModelMatch::Exact);
        }

        std::iter::once(&self.id)
            .chain(self.prefixes.iter())
            .filter(|prefix| !prefix.is_empty() && model.starts_with(prefix.as_str()))
            .map(String::len)
            .max()
            .map(ModelMatch::Prefix)
    }
}

/// Execution mode of a routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Wait for the complete response
    Buffered,
    /// Relay chunks as they arrive
    Streamed,
}

/// Uniform transport to one upstream provider
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Request a complete (buffered) completion
    async fn complete(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<CompletionResult, GatewayError>;

    /// Request a streamed completion.
    ///
    /// Dropping the returned stream cancels the upstream exchange.
    async fn stream(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError>;
}
