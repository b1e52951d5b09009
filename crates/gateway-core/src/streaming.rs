//! Streaming chunk types.

use crate::request::MessageRole;
use crate::response::{FinishReason, Usage};
use serde::{Deserialize, Serialize};

/// One incremental unit of a streamed completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Completion ID (shared by all chunks of one stream)
    pub id: String,
    /// Object type, always `chat.completion.chunk`
    #[serde(default = "chunk_object")]
    pub object: String,
    /// Creation timestamp (Unix seconds)
    #[serde(default)]
    pub created: i64,
    /// Model producing the stream
    pub model: String,
    /// Per-choice deltas
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, usually only present on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn chunk_object() -> String {
    "chat.completion.chunk".to_string()
}

impl CompletionChunk {
    /// Create a content chunk for the first choice
    pub fn text(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: chunk_object(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(content.into()),
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// Mark the first choice as finished
    #[must_use]
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        if let Some(choice) = self.choices.first_mut() {
            choice.finish_reason = Some(reason);
        }
        self
    }

    /// Attach usage information
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Concatenated delta content of all choices
    #[must_use]
    pub fn delta_content(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.content.as_deref())
            .collect()
    }

    /// Finish reason of the first choice
    #[must_use]
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.choices.first().and_then(|c| c.finish_reason)
    }
}

/// Per-choice delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Partial content
    pub delta: ChunkDelta,
    /// Why generation stopped, on the last chunk
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Partial message content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, usually only on the first chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Content fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
