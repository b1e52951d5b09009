//! HTTP request handlers for the gateway API.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use gateway_billing::{Charge, ReservationGuard, Resolution};
use gateway_config::PartialUsagePolicy;
use gateway_core::{
    ChatCompletionRequest, GatewayError, ModelObject, ModelsResponse,
    ProviderProfile,
};
use gateway_routing::ExecutionOutput;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::{
    error::ApiError,
    extractors::{Caller, RequestId},
    lifecycle::{Lifecycle, RequestState},
    relay::{ChannelSink, RelayEnd, RelayOutcome, SseRelay},
    state::AppState,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Current time (RFC 3339)
    pub timestamp: String,
    /// Uptime in seconds
    pub uptime: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.uptime().as_secs(),
    })
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .render()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

fn model_catalog(state: &AppState) -> Vec<ModelObject> {
    let mut models = state.router.registry().models();
    for model in &mut models {
        if let Some(pricing) = state.price_book.model_pricing(&model.id) {
            model.pricing = pricing;
        }
    }
    models
}

/// List models endpoint (OpenAI compatible)
#[instrument(skip(state, caller), fields(caller_id = %caller.id))]
pub async fn list_models(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Json<ModelsResponse> {
    Json(ModelsResponse::new(model_catalog(&state)))
}

/// Get model endpoint
#[instrument(skip(state, caller), fields(caller_id = %caller.id))]
pub async fn get_model(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(model_id): Path<String>,
) -> Result<Json<ModelObject>, ApiError> {
    model_catalog(&state)
        .into_iter()
        .find(|m| m.id == model_id)
        .map(Json)
        .ok_or_else(|| GatewayError::model_not_found(model_id).into())
}

/// Chat completion endpoint (OpenAI compatible).
///
/// Stages run in order: rate limit, validate, reserve, route, execute,
/// resolve. Every exit after a successful reservation debits or releases it.
#[instrument(skip_all, fields(request_id = %request_id, caller_id = %caller.id))]
pub async fn chat_completion(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Caller(caller): Caller,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let mut lifecycle = Lifecycle::new(request_id);
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = ApiError::from(rejection);
            warn!(status = %err.status, error = %err.message, "Unreadable request body");
            lifecycle.advance(RequestState::Failed);
            return Err(err);
        }
    };

    if let Some(limiter) = &state.rate_limiter {
        lifecycle.check(limiter.check(&caller.id))?;
    }

    let request = lifecycle.check(ChatCompletionRequest::from_slice(&body))?;
    lifecycle.advance(RequestState::Validated);
    let model = request.model().to_string();
    let streaming = request.is_stream();

    let estimate = state.price_book.estimate(&request);
    let guard = lifecycle.check(
        ReservationGuard::reserve(Arc::clone(&state.ledger), &caller, &model, estimate).await,
    )?;
    lifecycle.advance(RequestState::Reserved);

    let decision = match state.router.route(&request, &caller) {
        Ok(decision) => decision,
        Err(e) => {
            let label = model_label(&model, None);
            return Err(abort(&state, &mut lifecycle, guard, label, "none", streaming, e).await);
        }
    };
    lifecycle.advance(RequestState::Routed);
    let label = model_label(&model, Some(&decision.provider.profile)).to_string();

    let execution = match state.router.execute(&decision, &request).await {
        Ok(execution) => execution,
        Err(e) => {
            let provider = decision.provider.id().to_string();
            return Err(abort(&state, &mut lifecycle, guard, &label, &provider, streaming, e).await);
        }
    };

    let provider = execution.provider;
    if let Some(from) = &execution.fell_back_from {
        state.metrics.record_fallback(from, &provider.id);
    }

    match execution.output {
        ExecutionOutput::Buffered(mut result) => {
            let tokens = result.usage.total_tokens;
            let charge = state.price_book.charge(&model, &provider, tokens);
            if let Err(e) = guard.debit(charge).await {
                return Err(fail(&state, &mut lifecycle, &label, &provider.id, false, e));
            }
            state.metrics.record_credit_resolution(Resolution::Debited.as_str());
            state.metrics.record_tokens(&provider.id, tokens);
            state
                .metrics
                .record_request(&label, &provider.id, "completed", false, lifecycle.elapsed());
            lifecycle.complete();

            info!(
                provider = %provider.id,
                total_tokens = tokens,
                amount = charge.amount,
                duration_ms = lifecycle.elapsed().as_millis() as u64,
                "Chat completion served"
            );

            result.provider = Some(provider.id.clone());
            Ok(Json(result).into_response())
        }
        ExecutionOutput::Streamed(stream) => {
            let (sink, body) = ChannelSink::channel();
            let policy = state.config.billing.on_stream_failure;

            tokio::spawn(
                async move {
                    let mut relay = SseRelay::new(sink);
                    let outcome = relay.forward(stream).await;
                    let resolution =
                        settle_stream(&state, guard, &model, &provider, &outcome, policy).await;
                    relay.finish(&outcome).await;

                    state.metrics.record_stream_chunks(outcome.chunks_sent);
                    state.metrics.record_request(
                        &label,
                        &provider.id,
                        outcome.label(),
                        true,
                        lifecycle.elapsed(),
                    );
                    match &outcome.end {
                        RelayEnd::Completed => lifecycle.complete(),
                        RelayEnd::UpstreamFailed(e) => lifecycle.fail(e),
                        RelayEnd::ClientDisconnected => lifecycle.fail(
                            &GatewayError::internal("client disconnected during stream"),
                        ),
                    }

                    info!(
                        provider = %provider.id,
                        outcome = outcome.label(),
                        chunks = outcome.chunks_sent,
                        total_tokens = outcome.total_tokens,
                        resolution = resolution.map(Resolution::as_str),
                        "Chat completion stream finished"
                    );
                }
                .in_current_span(),
            );

            Ok((
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response())
        }
    }
}

/// Bounded metrics label for `model`.
///
/// Only models the routed provider advertises are used verbatim; prefix
/// matches collapse to `"other"` and unrouted requests to `"unknown"`.
fn model_label<'a>(model: &'a str, provider: Option<&ProviderProfile>) -> &'a str {
    match provider {
        Some(profile) if profile.models.iter().any(|m| m == model) => model,
        Some(_) => "other",
        None => "unknown",
    }
}

/// Release the reservation and surface `error`
async fn abort(
    state: &AppState,
    lifecycle: &mut Lifecycle,
    guard: ReservationGuard,
    model_label: &str,
    provider: &str,
    streaming: bool,
    error: GatewayError,
) -> ApiError {
    release(state, guard).await;
    fail(state, lifecycle, model_label, provider, streaming, error)
}

fn fail(
    state: &AppState,
    lifecycle: &mut Lifecycle,
    model_label: &str,
    provider: &str,
    streaming: bool,
    error: GatewayError,
) -> ApiError {
    warn!(model = %model_label, provider = %provider, kind = error.kind(), error = %error, "Chat completion failed");
    state
        .metrics
        .record_request(model_label, provider, error.kind(), streaming, lifecycle.elapsed());
    lifecycle.fail(&error);
    error.into()
}

async fn release(state: &AppState, guard: ReservationGuard) -> Option<Resolution> {
    match guard.release().await {
        Ok(resolution) => {
            state.metrics.record_credit_resolution(resolution.as_str());
            Some(resolution)
        }
        Err(e) => {
            warn!(error = %e, "Failed to release reservation");
            None
        }
    }
}

async fn debit(state: &AppState, guard: ReservationGuard, charge: Charge, provider: &str) -> Option<Resolution> {
    match guard.debit(charge).await {
        Ok(resolution) => {
            state.metrics.record_credit_resolution(resolution.as_str());
            state.metrics.record_tokens(provider, charge.total_tokens);
            Some(resolution)
        }
        Err(e) => {
            warn!(error = %e, "Failed to debit reservation");
            None
        }
    }
}

/// Resolve the reservation of a finished stream.
///
/// A completed stream is debited. A failed or abandoned one is debited for
/// the tokens consumed under [`PartialUsagePolicy::DebitConsumed`], and
/// released otherwise or when nothing was consumed.
async fn settle_stream(
    state: &AppState,
    guard: ReservationGuard,
    model: &str,
    provider: &ProviderProfile,
    outcome: &RelayOutcome,
    policy: PartialUsagePolicy,
) -> Option<Resolution> {
    let charge_consumed = outcome.is_completed()
        || (policy == PartialUsagePolicy::DebitConsumed && outcome.total_tokens > 0);

    if charge_consumed {
        let charge = state.price_book.charge(model, provider, outcome.total_tokens);
        debug!(
            outcome = outcome.label(),
            total_tokens = charge.total_tokens,
            amount = charge.amount,
            "Debiting stream usage"
        );
        debit(state, guard, charge, &provider.id).await
    } else {
        debug!(outcome = outcome.label(), "Releasing stream reservation");
        release(state, guard).await
    }
}
