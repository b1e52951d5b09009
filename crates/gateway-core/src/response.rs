//! Response types for the gateway (OpenAI-compatible).

use crate::provider::Pricing;
use crate::request::MessageRole;
use serde::{Deserialize, Serialize};

/// Buffered chat completion result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Completion ID
    pub id: String,
    /// Object type, always `chat.completion`
    #[serde(default = "completion_object")]
    pub object: String,
    /// Creation timestamp (Unix seconds)
    pub created: i64,
    /// Model that produced the completion
    pub model: String,
    /// Completion choices
    pub choices: Vec<Choice>,
    /// Token usage
    pub usage: Usage,
    /// Provider that served the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

fn completion_object() -> String {
    "chat.completion".to_string()
}

impl CompletionResult {
    /// Text of the first choice, if any
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: ResponseMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Message generated by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Author role (always assistant)
    pub role: MessageRole,
    /// Generated text
    #[serde(default)]
    pub content: Option<String>,
}

/// Reason generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Token limit reached
    Length,
    /// Content filtered by the provider
    ContentFilter,
    /// Model requested tool calls
    ToolCalls,
}

impl FinishReason {
    /// Parse an upstream finish reason string
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "length" => Some(Self::Length),
            "content_filter" => Some(Self::ContentFilter),
            "tool_calls" | "function_call" => Some(Self::ToolCalls),
            _ => None,
        }
    }
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

impl Usage {
    /// Create usage from prompt and completion counts
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage for a response whose provider reported none
    #[must_use]
    pub fn estimated(prompt_tokens: u64, completion: &str) -> Self {
        Self::new(prompt_tokens, estimate_tokens(completion.chars().count() as u64))
    }
}

/// Approximate token count of `chars` characters of text (about four per token)
#[must_use]
pub const fn estimate_tokens(chars: u64) -> u64 {
    chars.div_ceil(4)
}

/// Model descriptor returned by `GET /v1/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Model ID
    pub id: String,
    /// Object type, always `model`
    pub object: String,
    /// Provider that owns the model
    pub owned_by: String,
    /// Price charged for the model
    pub pricing: Pricing,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelObject {
    /// Create a model descriptor
    pub fn new(id: impl Into<String>, owned_by: impl Into<String>, pricing: Pricing) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            owned_by: owned_by.into(),
            pricing,
            description: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Model list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Object type, always `list`
    pub object: String,
    /// Models
    pub data: Vec<ModelObject>,
}

impl ModelsResponse {
    /// Create a model list
    #[must_use]
    pub fn new(data: Vec<ModelObject>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}
