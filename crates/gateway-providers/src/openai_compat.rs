//! OpenAI-compatible provider transport.
//!
//! Groq, OpenRouter, DeepSeek, Mistral and OpenAI itself all expose the
//! `/chat/completions` dialect, so a single transport serves every
//! configured profile. The profile supplies the base URL and API key.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use gateway_core::{
    ChatCompletionRequest, ChatMessage, Choice, ChunkChoice, ChunkDelta, ChunkStream,
    CompletionChunk, CompletionResult, FinishReason, GatewayError, MessageRole, ProviderProfile,
    ProviderTransport, ResponseMessage, Usage,
};
use reqwest::{Client, StatusCode};
use reqwest_eventsource::{retry::Never, Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Default connect timeout for upstream connections
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport speaking the OpenAI chat-completions protocol over HTTPS
#[derive(Debug, Clone)]
pub struct OpenAICompatTransport {
    client: Client,
}

impl OpenAICompatTransport {
    /// Create a transport with a fresh connection pool
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Create a transport sharing an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn completions_url(profile: &ProviderProfile) -> String {
        format!("{}/chat/completions", profile.base_url.trim_end_matches('/'))
    }

    fn api_key(profile: &ProviderProfile) -> Result<&SecretString, GatewayError> {
        profile.api_key.as_ref().ok_or_else(|| {
            GatewayError::upstream(
                &profile.id,
                format!(
                    "missing API key{}",
                    profile
                        .api_key_ref
                        .as_deref()
                        .map(|var| format!(" ({var} is not set)"))
                        .unwrap_or_default()
                ),
                None,
                true,
            )
        })
    }
}

/// Map an upstream HTTP error status to a gateway error
pub fn map_status_error(provider: &str, status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<UpstreamErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.chars().take(512).collect()
            }
        });

    let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    GatewayError::upstream(
        provider,
        format!("upstream returned {}: {message}", status.as_u16()),
        Some(status.as_u16()),
        retryable,
    )
}

fn map_transport_error(provider: &str, err: &reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_timeout() {
        GatewayError::upstream(provider, format!("connection failed: {err}"), None, true)
    } else {
        GatewayError::upstream(provider, format!("request failed: {err}"), None, true)
    }
}

#[async_trait]
impl ProviderTransport for OpenAICompatTransport {
    async fn complete(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        let api_key = Self::api_key(profile)?;
        let body = UpstreamRequest::from_request(request, false);

        debug!(provider = %profile.id, model = %request.model(), "Sending buffered completion request");

        let response = self
            .client
            .post(Self::completions_url(profile))
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&profile.id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(provider = %profile.id, status = %status, "Upstream rejected completion request");
            return Err(map_status_error(&profile.id, status, &text));
        }

        let upstream: UpstreamResponse = response.json().await.map_err(|e| {
            GatewayError::upstream(
                &profile.id,
                format!("Failed to parse response: {e}"),
                Some(status.as_u16()),
                false,
            )
        })?;

        Ok(upstream.into_result(&profile.id, request))
    }

    async fn stream(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError> {
        let api_key = Self::api_key(profile)?;
        let body = UpstreamRequest::from_request(request, true);

        debug!(provider = %profile.id, model = %request.model(), "Starting streaming request");

        let builder = self
            .client
            .post(Self::completions_url(profile))
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        let mut event_source = EventSource::new(builder).map_err(|e| {
            GatewayError::internal(format!("Failed to create event source: {e}"))
        })?;
        event_source.set_retry_policy(Box::new(Never));

        let provider_id = profile.id.clone();
        let model = request.model().to_string();

        let stream = try_stream! {
            let mut es = event_source;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        trace!(provider = %provider_id, "Upstream stream opened");
                    }
                    Ok(Event::Message(msg)) => {
                        let data = msg.data.trim();
                        if data == "[DONE]" {
                            break;
                        }

                        match serde_json::from_str::<UpstreamChunk>(data) {
                            Ok(chunk) => yield chunk.into_chunk(&model),
                            Err(e) => {
                                warn!(provider = %provider_id, error = %e, "Skipping unparseable upstream chunk");
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let text = response.text().await.unwrap_or_default();
                        es.close();
                        Err(map_status_error(&provider_id, status, &text))?;
                    }
                    Err(reqwest_eventsource::Error::Transport(e)) => {
                        error!(provider = %provider_id, error = %e, "Upstream stream transport error");
                        es.close();
                        Err(map_transport_error(&provider_id, &e))?;
                    }
                    Err(e) => {
                        error!(provider = %provider_id, error = %e, "Upstream stream error");
                        es.close();
                        Err(GatewayError::upstream(
                            &provider_id,
                            format!("stream error: {e}"),
                            None,
                            false,
                        ))?;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

fn no_stop_sequences(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl<'a> UpstreamRequest<'a> {
    fn from_request(request: &'a ChatCompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model(),
            messages: request.messages(),
            temperature: request.temperature().map(|t| t.value()),
            max_tokens: request.max_tokens().map(|m| m.value()),
            top_p: request.top_p().map(|t| t.value()),
            frequency_penalty: request.frequency_penalty().map(|p| p.value()),
            presence_penalty: request.presence_penalty().map(|p| p.value()),
            stop: request.stop(),
            user: request.user(),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<UpstreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChoice {
    #[serde(default)]
    index: u32,
    message: UpstreamMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMessage {
    #[serde(default)]
    content: Option<String>,
}

impl UpstreamResponse {
    fn into_result(self, provider: &str, request: &ChatCompletionRequest) -> CompletionResult {
        let choices: Vec<Choice> = self
            .choices
            .into_iter()
            .map(|c| Choice {
                index: c.index,
                message: ResponseMessage {
                    role: MessageRole::Assistant,
                    content: c.message.content,
                },
                finish_reason: c.finish_reason.as_deref().and_then(FinishReason::parse),
            })
            .collect();

        let usage = self.usage.unwrap_or_else(|| {
            let content: String = choices
                .iter()
                .filter_map(|c| c.message.content.as_deref())
                .collect();
            debug!(provider = %provider, "Upstream reported no usage, estimating from content");
            Usage::estimated(request.estimated_prompt_tokens(), &content)
        });

        CompletionResult {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model.unwrap_or_else(|| request.model().to_string()),
            choices,
            usage,
            provider: Some(provider.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    choices: Vec<UpstreamChunkChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct UpstreamChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: UpstreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl UpstreamChunk {
    fn into_chunk(self, model: &str) -> CompletionChunk {
        CompletionChunk {
            id: self.id,
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: model.to_string(),
            choices: self
                .choices
                .into_iter()
                .map(|c| ChunkChoice {
                    index: c.index,
                    delta: ChunkDelta {
                        role: c.delta.role.as_deref().and_then(|r| match r {
                            "assistant" => Some(MessageRole::Assistant),
                            "user" => Some(MessageRole::User),
                            "system" => Some(MessageRole::System),
                            _ => None,
                        }),
                        content: c.delta.content,
                    },
                    finish_reason: c.finish_reason.as_deref().and_then(FinishReason::parse),
                })
                .collect(),
            usage: self.usage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    #[serde(default)]
    message: Option<String>,
}
