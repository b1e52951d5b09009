//! Scripted provider transport for tests.
//!
//! Each provider ID is given a [`Script`] describing how calls to it behave:
//! answer with content, fail immediately, fail after N streamed chunks, or
//! never answer. Calls and yielded chunks are counted so tests can assert on
//! fallback attempts and stream cancellation.

use async_trait::async_trait;
use futures::StreamExt;
use gateway_core::{
    ChatCompletionRequest, Choice, ChunkStream, CompletionChunk, CompletionResult, ExecutionMode,
    FinishReason, GatewayError, MessageRole, ProviderProfile, ProviderTransport, ResponseMessage,
    Usage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour of one scripted provider
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with content
    Respond(ScriptedResponse),
    /// Fail before producing anything
    Fail(GatewayError),
    /// Never produce a first byte
    Hang,
}

/// Content returned by a scripted provider
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    deltas: Vec<String>,
    usage: Option<Usage>,
    fail_after: Option<(usize, GatewayError)>,
    first_byte_delay: Option<Duration>,
    chunk_delay: Option<Duration>,
}

impl ScriptedResponse {
    /// Respond with these content deltas (joined for buffered calls)
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            usage: None,
            fail_after: None,
            first_byte_delay: None,
            chunk_delay: None,
        }
    }

    /// Respond with a single piece of content
    pub fn text(content: impl Into<String>) -> Self {
        Self::deltas([content.into()])
    }

    /// Report this usage (on the final chunk when streaming)
    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some(Usage::new(prompt_tokens, completion_tokens));
        self
    }

    /// Fail with `error` after emitting `chunks` chunks
    #[must_use]
    pub fn fail_after(mut self, chunks: usize, error: GatewayError) -> Self {
        self.fail_after = Some((chunks, error));
        self
    }

    /// Wait before the first byte
    #[must_use]
    pub fn with_first_byte_delay(mut self, delay: Duration) -> Self {
        self.first_byte_delay = Some(delay);
        self
    }

    /// Wait between chunks
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }
}

/// A call observed by the scripted transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    /// Provider called
    pub provider: String,
    /// Requested model
    pub model: String,
    /// Buffered or streamed
    pub mode: ExecutionMode,
}

/// Transport double driven by per-provider scripts
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<ScriptedCall>>,
    chunks_yielded: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    /// Create a transport with no scripts; unscripted providers fail with 503
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behaviour of `provider`
    #[must_use]
    pub fn with_script(self, provider: impl Into<String>, script: Script) -> Self {
        self.scripts.lock().insert(provider.into(), script);
        self
    }

    /// All calls, in order
    #[must_use]
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made to `provider`
    #[must_use]
    pub fn call_count(&self, provider: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.provider == provider).count()
    }

    /// Chunks pulled from all scripted streams so far
    #[must_use]
    pub fn chunks_yielded(&self) -> usize {
        self.chunks_yielded.load(Ordering::SeqCst)
    }

    fn script_for(&self, profile: &ProviderProfile, request: &ChatCompletionRequest, mode: ExecutionMode) -> Script {
        self.calls.lock().push(ScriptedCall {
            provider: profile.id.clone(),
            model: request.model().to_string(),
            mode,
        });
        self.scripts
            .lock()
            .get(&profile.id)
            .cloned()
            .unwrap_or_else(|| {
                Script::Fail(GatewayError::upstream(&profile.id, "no script", Some(503), true))
            })
    }
}

fn completion_id(provider: &str) -> String {
    format!("chatcmpl-{provider}-{}", uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn complete(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<CompletionResult, GatewayError> {
        let response = match self.script_for(profile, request, ExecutionMode::Buffered) {
            Script::Respond(response) => response,
            Script::Fail(err) => return Err(err),
            Script::Hang => futures::future::pending().await,
        };

        if let Some(delay) = response.first_byte_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, err)) = response.fail_after {
            return Err(err);
        }

        let content: String = response.deltas.concat();
        let usage = response
            .usage
            .unwrap_or_else(|| Usage::estimated(request.estimated_prompt_tokens(), &content));

        Ok(CompletionResult {
            id: completion_id(&profile.id),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: request.model().to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: MessageRole::Assistant,
                    content: Some(content),
                },
                finish_reason: Some(FinishReason::Stop),
            }],
            usage,
            provider: Some(profile.id.clone()),
        })
    }

    async fn stream(
        &self,
        profile: &ProviderProfile,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, GatewayError> {
        let response = match self.script_for(profile, request, ExecutionMode::Streamed) {
            Script::Respond(response) => response,
            Script::Fail(err) => return Err(err),
            Script::Hang => return Ok(futures::stream::pending().boxed()),
        };

        let id = completion_id(&profile.id);
        let model = request.model().to_string();
        let yielded = Arc::clone(&self.chunks_yielded);

        let stream = async_stream::stream! {
            if let Some(delay) = response.first_byte_delay {
                tokio::time::sleep(delay).await;
            }

            let total = response.deltas.len();
            for (index, delta) in response.deltas.into_iter().enumerate() {
                if let Some((after, err)) = &response.fail_after {
                    if index == *after {
                        yield Err(err.clone());
                        return;
                    }
                }
                if index > 0 {
                    if let Some(delay) = response.chunk_delay {
                        tokio::time::sleep(delay).await;
                    }
                }

                let mut chunk = CompletionChunk::text(&id, &model, delta);
                if index + 1 == total && response.fail_after.is_none() {
                    chunk = chunk.with_finish_reason(FinishReason::Stop);
                    if let Some(usage) = response.usage {
                        chunk = chunk.with_usage(usage);
                    }
                }
                yielded.fetch_add(1, Ordering::SeqCst);
                yield Ok(chunk);
            }

            if let Some((_, err)) = response.fail_after {
                yield Err(err);
            }
        };

        Ok(Box::pin(stream))
    }
}
