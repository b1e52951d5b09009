//! # Gateway Core
//!
//! Core types, traits, and error handling for the IAFactory LLM gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Validated request value object and response/chunk types
//! - Provider profiles and the uniform provider transport trait
//! - Error taxonomy
//! - Validated domain types (newtypes)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult, TimeoutStage};
pub use provider::{
    ChunkStream, ExecutionMode, ModelMatch, Pricing, ProviderProfile, ProviderTransport,
};
pub use request::{ChatCompletionRequest, ChatMessage, MessageRole};
pub use response::{
    estimate_tokens, Choice, CompletionResult, FinishReason, ModelObject, ModelsResponse,
    ResponseMessage, Usage,
};
pub use streaming::{ChunkChoice, ChunkDelta, CompletionChunk};
pub use types::{
    CallerIdentity, CallerRole, FrequencyPenalty, MaxTokens, ModelId, PresencePenalty,
    Temperature, TopP,
};
