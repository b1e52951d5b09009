//! Request types for the gateway.
//!
//! A [`ChatCompletionRequest`] can only be obtained by validating a raw body
//! (or through the builder, which runs the same checks). Once built it is
//! immutable: fields are private and exposed through accessors.

use crate::error::GatewayError;
use crate::types::{FrequencyPenalty, MaxTokens, ModelId, PresencePenalty, Temperature, TopP};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of stop sequences accepted
pub const MAX_STOP_SEQUENCES: usize = 4;

/// Validated, immutable chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    model: ModelId,
    messages: Vec<ChatMessage>,
    temperature: Option<Temperature>,
    max_tokens: Option<MaxTokens>,
    top_p: Option<TopP>,
    frequency_penalty: Option<FrequencyPenalty>,
    presence_penalty: Option<PresencePenalty>,
    stop: Vec<String>,
    user: Option<String>,
    stream: bool,
}

impl ChatCompletionRequest {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> ChatCompletionRequestBuilder {
        ChatCompletionRequestBuilder::default()
    }

    /// Parse and validate a raw JSON body
    ///
    /// # Errors
    /// Returns a validation error for malformed JSON or the first field
    /// constraint violated
    pub fn from_slice(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::validation("body", format!("invalid JSON: {e}")))?;
        Self::validate(&value)
    }

    /// Validate an already-parsed JSON body.
    ///
    /// Fields are checked in a fixed order and the first violation wins.
    ///
    /// # Errors
    /// Returns a validation error naming the offending field
    pub fn validate(raw: &Value) -> Result<Self, GatewayError> {
        let body = raw
            .as_object()
            .ok_or_else(|| GatewayError::validation("body", "must be a JSON object"))?;

        let model = match body.get("model") {
            Some(Value::String(s)) => ModelId::new(s.as_str())?,
            Some(Value::Null) | None => {
                return Err(GatewayError::validation("model", "is required"));
            }
            Some(_) => return Err(GatewayError::validation("model", "must be a string")),
        };

        let messages = parse_messages(body)?;

        let temperature = optional_f64(body, "temperature")?
            .map(Temperature::new)
            .transpose()?;

        let max_tokens = match body.get("max_tokens") {
            Some(Value::Null) | None => None,
            Some(Value::Number(n)) => {
                let value = n.as_i64().ok_or_else(|| {
                    GatewayError::validation("max_tokens", "must be a positive integer")
                })?;
                Some(MaxTokens::new(value)?)
            }
            Some(_) => {
                return Err(GatewayError::validation("max_tokens", "must be a positive integer"));
            }
        };

        let top_p = optional_f64(body, "top_p")?.map(TopP::new).transpose()?;
        let frequency_penalty = optional_f64(body, "frequency_penalty")?
            .map(FrequencyPenalty::new)
            .transpose()?;
        let presence_penalty = optional_f64(body, "presence_penalty")?
            .map(PresencePenalty::new)
            .transpose()?;

        let stream = match body.get("stream") {
            Some(Value::Null) | None => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(GatewayError::validation("stream", "must be a boolean")),
        };

        let stop = parse_stop(body)?;

        let user = match body.get("user") {
            Some(Value::Null) | None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(GatewayError::validation("user", "must be a string")),
        };

        Ok(Self {
            model,
            messages,
            temperature,
            max_tokens,
            top_p,
            frequency_penalty,
            presence_penalty,
            stop,
            user,
            stream,
        })
    }

    /// Requested model
    #[must_use]
    pub fn model(&self) -> &str {
        self.model.as_str()
    }

    /// Conversation messages (never empty)
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sampling temperature
    #[must_use]
    pub fn temperature(&self) -> Option<Temperature> {
        self.temperature
    }

    /// Maximum tokens to generate
    #[must_use]
    pub fn max_tokens(&self) -> Option<MaxTokens> {
        self.max_tokens
    }

    /// Nucleus sampling parameter
    #[must_use]
    pub fn top_p(&self) -> Option<TopP> {
        self.top_p
    }

    /// Frequency penalty
    #[must_use]
    pub fn frequency_penalty(&self) -> Option<FrequencyPenalty> {
        self.frequency_penalty
    }

    /// Presence penalty
    #[must_use]
    pub fn presence_penalty(&self) -> Option<PresencePenalty> {
        self.presence_penalty
    }

    /// Stop sequences
    #[must_use]
    pub fn stop(&self) -> &[String] {
        &self.stop
    }

    /// End-user identifier forwarded to the provider
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Whether the caller asked for a streamed response
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Rough prompt size in tokens (~4 characters per token)
    #[must_use]
    pub fn estimated_prompt_tokens(&self) -> u64 {
        let chars: usize = self.messages.iter().map(|m| m.content.chars().count()).sum();
        (chars as u64).div_ceil(4).max(1)
    }
}

fn optional_f64(body: &Map<String, Value>, field: &str) -> Result<Option<f64>, GatewayError> {
    match body.get(field) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| GatewayError::validation(field, "must be a number")),
        Some(_) => Err(GatewayError::validation(field, "must be a number")),
    }
}

fn parse_messages(body: &Map<String, Value>) -> Result<Vec<ChatMessage>, GatewayError> {
    let items = match body.get("messages") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => {
            return Err(GatewayError::validation("messages", "is required"));
        }
        Some(_) => return Err(GatewayError::validation("messages", "must be an array")),
    };

    if items.is_empty() {
        return Err(GatewayError::validation(
            "messages",
            "must contain at least one message",
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let message = item.as_object().ok_or_else(|| {
                GatewayError::validation(format!("messages[{index}]"), "must be an object")
            })?;

            let role = match message.get("role") {
                Some(Value::String(role)) => MessageRole::parse(role).ok_or_else(|| {
                    GatewayError::validation(
                        format!("messages[{index}].role"),
                        format!("must be one of system, user, assistant; got '{role}'"),
                    )
                })?,
                _ => {
                    return Err(GatewayError::validation(
                        format!("messages[{index}].role"),
                        "is required and must be a string",
                    ));
                }
            };

            let content = match message.get("content") {
                Some(Value::String(content)) => content.clone(),
                _ => {
                    return Err(GatewayError::validation(
                        format!("messages[{index}].content"),
                        "is required and must be a string",
                    ));
                }
            };

            Ok(ChatMessage { role, content })
        })
        .collect()
}

fn parse_stop(body: &Map<String, Value>) -> Result<Vec<String>, GatewayError> {
    let stop = match body.get("stop") {
        Some(Value::Null) | None => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| GatewayError::validation("stop", "entries must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(GatewayError::validation(
                "stop",
                "must be a string or an array of strings",
            ));
        }
    };

    if stop.len() > MAX_STOP_SEQUENCES {
        return Err(GatewayError::validation(
            "stop",
            format!("at most {MAX_STOP_SEQUENCES} sequences are allowed"),
        ));
    }
    Ok(stop)
}

/// Builder for [`ChatCompletionRequest`].
///
/// `build` applies the same constraints as body validation.
#[derive(Debug, Default)]
pub struct ChatCompletionRequestBuilder {
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    top_p: Option<f64>,
    frequency_penalty: Option<f64>,
    presence_penalty: Option<f64>,
    stop: Vec<String>,
    user: Option<String>,
    stream: bool,
}

impl ChatCompletionRequestBuilder {
    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set top_p
    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set frequency_penalty
    #[must_use]
    pub fn frequency_penalty(mut self, value: f64) -> Self {
        self.frequency_penalty = Some(value);
        self
    }

    /// Set presence_penalty
    #[must_use]
    pub fn presence_penalty(mut self, value: f64) -> Self {
        self.presence_penalty = Some(value);
        self
    }

    /// Add a stop sequence
    #[must_use]
    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.stop.push(sequence.into());
        self
    }

    /// Set the end-user identifier
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Enable streaming
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns a validation error if any field is missing or out of range
    pub fn build(self) -> Result<ChatCompletionRequest, GatewayError> {
        let model = self
            .model
            .ok_or_else(|| GatewayError::validation("model", "is required"))?;
        let model = ModelId::new(model)?;

        if self.messages.is_empty() {
            return Err(GatewayError::validation(
                "messages",
                "must contain at least one message",
            ));
        }
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return Err(GatewayError::validation(
                "stop",
                format!("at most {MAX_STOP_SEQUENCES} sequences are allowed"),
            ));
        }

        Ok(ChatCompletionRequest {
            model,
            messages: self.messages,
            temperature: self.temperature.map(Temperature::new).transpose()?,
            max_tokens: self.max_tokens.map(MaxTokens::new).transpose()?,
            top_p: self.top_p.map(TopP::new).transpose()?,
            frequency_penalty: self.frequency_penalty.map(FrequencyPenalty::new).transpose()?,
            presence_penalty: self.presence_penalty.map(PresencePenalty::new).transpose()?,
            stop: self.stop,
            user: self.user,
            stream: self.stream,
        })
    }
}

/// Chat message with role and content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,
    /// Text content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl MessageRole {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_of(err: GatewayError) -> String {
        match err {
            GatewayError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_fixture_body_validates() {
        let body = br#"{"model":"gpt-x","messages":[{"role":"user","content":"hi"}],"stream":true}"#;
        let request = ChatCompletionRequest::from_slice(body).expect("valid request");

        assert_eq!(request.model(), "gpt-x");
        assert_eq!(request.messages().len(), 1);
        assert_eq!(request.messages()[0].role, MessageRole::User);
        assert!(request.is_stream());
        assert!(request.temperature().is_none());
    }

    #[test]
    fn test_stream_defaults_to_false() {
        let request = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "system", "content": "be brief"}]
        }))
        .expect("valid request");
        assert!(!request.is_stream());
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = ChatCompletionRequest::validate(&json!({"model": "gpt-x", "messages": []}))
            .expect_err("empty messages");
        assert_eq!(field_of(err), "messages");
    }

    #[test]
    fn test_temperature_out_of_range() {
        let err = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 3.0
        }))
        .expect_err("temperature too high");
        assert_eq!(field_of(err), "temperature");
    }

    #[test]
    fn test_first_violation_wins() {
        let err = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 5.0,
            "top_p": 9.0
        }))
        .expect_err("two violations");
        assert_eq!(field_of(err), "temperature");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}, {"role": "tool", "content": "x"}]
        }))
        .expect_err("tool role");
        assert_eq!(field_of(err), "messages[1].role");
    }

    #[test]
    fn test_max_tokens_must_be_positive_integer() {
        for value in [json!(0), json!(-1), json!(1.5), json!("10")] {
            let err = ChatCompletionRequest::validate(&json!({
                "model": "gpt-x",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": value
            }))
            .expect_err("invalid max_tokens");
            assert_eq!(field_of(err), "max_tokens");
        }
    }

    #[test]
    fn test_penalties_and_top_p() {
        let request = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "top_p": 0.9,
            "frequency_penalty": -2.0,
            "presence_penalty": 2.0,
            "max_tokens": 64
        }))
        .expect("valid request");
        assert_eq!(request.max_tokens().map(MaxTokens::value), Some(64));

        let err = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "presence_penalty": -2.5
        }))
        .expect_err("presence penalty too low");
        assert_eq!(field_of(err), "presence_penalty");
    }

    #[test]
    fn test_malformed_json() {
        let err = ChatCompletionRequest::from_slice(b"{invalid json}").expect_err("bad json");
        assert_eq!(field_of(err), "body");

        let err = ChatCompletionRequest::from_slice(b"[1,2]").expect_err("not an object");
        assert_eq!(field_of(err), "body");
    }

    #[test]
    fn test_stop_accepts_string_or_array() {
        let request = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": "END"
        }))
        .expect("valid request");
        assert_eq!(request.stop(), ["END".to_string()]);

        let err = ChatCompletionRequest::validate(&json!({
            "model": "gpt-x",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": ["a", "b", "c", "d", "e"]
        }))
        .expect_err("too many stops");
        assert_eq!(field_of(err), "stop");
    }

    #[test]
    fn test_builder_applies_same_checks() {
        let request = ChatCompletionRequest::builder()
            .model("deepseek-x")
            .message(ChatMessage::user("Hello"))
            .temperature(0.7)
            .max_tokens(100)
            .build()
            .expect("valid request");
        assert_eq!(request.model(), "deepseek-x");

        assert!(ChatCompletionRequest::builder().model("gpt-x").build().is_err());
        assert!(ChatCompletionRequest::builder()
            .model("gpt-x")
            .message(ChatMessage::user("Hello"))
            .temperature(3.0)
            .build()
            .is_err());
    }

    #[test]
    fn test_estimated_prompt_tokens() {
        let request = ChatCompletionRequest::builder()
            .model("gpt-x")
            .message(ChatMessage::user("12345678"))
            .build()
            .expect("valid request");
        assert_eq!(request.estimated_prompt_tokens(), 2);
    }
}
