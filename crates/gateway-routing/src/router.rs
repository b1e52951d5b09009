//! Provider selection and execution.
//!
//! Selection is a pure function of the requested model. Execution tries the
//! selected provider and, for fallback-eligible failures, exactly one
//! fallback provider.

use futures::StreamExt;
use gateway_core::{
    CallerIdentity, ChatCompletionRequest, ChunkStream, CompletionResult, ExecutionMode,
    GatewayError, GatewayResult, ProviderProfile, TimeoutStage,
};
use gateway_providers::{ProviderEntry, ProviderRegistry};
use gateway_resilience::{idle_timeout, with_deadline};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time budgets applied by the router
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Wait for the first streamed chunk
    pub first_byte_timeout: Duration,
    /// Maximum silence between streamed chunks
    pub idle_timeout: Duration,
    /// Budget for a complete buffered response
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            first_byte_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Provider selected for one request
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Selected provider
    pub provider: ProviderEntry,
    /// Provider tried if the selected one fails
    pub fallback: Option<ProviderEntry>,
    /// Buffered or streamed execution
    pub mode: ExecutionMode,
}

/// Output of a successful execution
pub enum ExecutionOutput {
    /// Complete response
    Buffered(CompletionResult),
    /// Lazy chunk sequence, first chunk already received
    Streamed(ChunkStream),
}

impl std::fmt::Debug for ExecutionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(result) => f.debug_tuple("Buffered").field(&result.id).finish(),
            Self::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

/// Successful execution and the provider that served it
#[derive(Debug)]
pub struct Execution {
    /// Provider that served the request
    pub provider: Arc<ProviderProfile>,
    /// Provider that failed first, if the fallback served the request
    pub fell_back_from: Option<String>,
    /// Completion or stream
    pub output: ExecutionOutput,
}

/// Routes validated requests to upstream providers
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ProviderRegistry>,
    config: RouterConfig,
}

impl Router {
    /// Create a router over `registry`
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    /// Provider registry
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Select the provider for `request`.
    ///
    /// # Errors
    /// Returns [`GatewayError::ModelNotFound`] when no provider serves the model.
    pub fn route(
        &self,
        request: &ChatCompletionRequest,
        caller: &CallerIdentity,
    ) -> GatewayResult<RoutingDecision> {
        let model = request.model();
        let provider = self
            .registry
            .resolve(model)
            .cloned()
            .ok_or_else(|| GatewayError::model_not_found(model))?;
        let fallback = self.registry.fallback_for(provider.id()).cloned();
        let mode = if request.is_stream() {
            ExecutionMode::Streamed
        } else {
            ExecutionMode::Buffered
        };

        debug!(
            caller_id = %caller.id,
            model = %model,
            provider = %provider.id(),
            fallback = fallback.as_ref().map(ProviderEntry::id),
            mode = ?mode,
            "Request routed"
        );

        Ok(RoutingDecision {
            provider,
            fallback,
            mode,
        })
    }

    /// Execute `request` against the decided provider, falling back at most once.
    ///
    /// # Errors
    /// - The primary's error when it is not fallback-eligible
    /// - [`GatewayError::UpstreamTimeout`] when every attempt timed out
    /// - [`GatewayError::UpstreamUnavailable`] otherwise
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        request: &ChatCompletionRequest,
    ) -> GatewayResult<Execution> {
        let primary = &decision.provider;
        let primary_err = match self.attempt(primary, request, decision.mode).await {
            Ok(output) => {
                return Ok(Execution {
                    provider: Arc::clone(&primary.profile),
                    fell_back_from: None,
                    output,
                })
            }
            Err(e) => e,
        };

        if !primary_err.is_fallback_eligible() {
            return Err(primary_err);
        }

        let Some(fallback) = &decision.fallback else {
            return Err(primary_err);
        };

        info!(
            from = %primary.id(),
            to = %fallback.id(),
            error = %primary_err,
            "Primary provider failed, trying fallback"
        );

        match self.attempt(fallback, request, decision.mode).await {
            Ok(output) => Ok(Execution {
                provider: Arc::clone(&fallback.profile),
                fell_back_from: Some(primary.id().to_string()),
                output,
            }),
            Err(fallback_err) => {
                warn!(
                    primary = %primary.id(),
                    fallback = %fallback.id(),
                    error = %fallback_err,
                    "Fallback provider failed"
                );
                Err(exhausted(primary.id(), &primary_err, &fallback_err))
            }
        }
    }

    async fn attempt(
        &self,
        entry: &ProviderEntry,
        request: &ChatCompletionRequest,
        mode: ExecutionMode,
    ) -> GatewayResult<ExecutionOutput> {
        let profile = entry.profile.as_ref();
        if !profile.is_available() {
            return Err(GatewayError::upstream(
                &profile.id,
                "provider has no API key configured",
                None,
                true,
            ));
        }

        match mode {
            ExecutionMode::Buffered => {
                let result = with_deadline(
                    &profile.id,
                    TimeoutStage::Request,
                    self.config.request_timeout,
                    entry.transport.complete(profile, request),
                )
                .await?;
                Ok(ExecutionOutput::Buffered(result))
            }
            ExecutionMode::Streamed => {
                let stream = with_deadline(
                    &profile.id,
                    TimeoutStage::FirstByte,
                    self.config.first_byte_timeout,
                    open_stream(entry, request),
                )
                .await?;
                Ok(ExecutionOutput::Streamed(idle_timeout(
                    stream,
                    &profile.id,
                    self.config.idle_timeout,
                )))
            }
        }
    }
}

/// Open a stream and wait for its first chunk.
///
/// An error before the first chunk fails the attempt; the returned stream
/// replays the first chunk ahead of the rest.
async fn open_stream(
    entry: &ProviderEntry,
    request: &ChatCompletionRequest,
) -> GatewayResult<ChunkStream> {
    let mut stream = entry.transport.stream(&entry.profile, request).await?;
    match stream.next().await {
        Some(Ok(first)) => Ok(futures::stream::iter([Ok(first)]).chain(stream).boxed()),
        Some(Err(e)) => Err(e),
        None => Ok(futures::stream::empty().boxed()),
    }
}

fn exhausted(primary: &str, primary_err: &GatewayError, fallback_err: &GatewayError) -> GatewayError {
    let both_timed_out = matches!(primary_err, GatewayError::UpstreamTimeout { .. })
        && matches!(fallback_err, GatewayError::UpstreamTimeout { .. });
    if both_timed_out {
        return fallback_err.clone();
    }

    let answered = [primary_err, fallback_err].into_iter().find_map(|e| match e {
        GatewayError::UpstreamUnavailable {
            status_code: Some(code),
            ..
        } => Some(*code),
        _ => None,
    });

    GatewayError::upstream(
        primary,
        format!("all providers failed ({primary_err}; {fallback_err})"),
        answered,
        false,
    )
}
