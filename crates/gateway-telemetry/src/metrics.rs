//! Prometheus metrics for the gateway.
//!
//! Metrics live in their own [`Registry`] so several gateways (or tests) can
//! coexist in one process.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metrics error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Registration or encoding failed
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Gateway metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    tokens_total: IntCounterVec,
    credit_resolutions: IntCounterVec,
    fallbacks_total: IntCounterVec,
    stream_chunks: IntCounter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all gateway metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be registered
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Chat completion requests by outcome"),
            &["model", "provider", "outcome"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Chat completion request duration",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["model", "streaming"],
        )?;
        let tokens_total = IntCounterVec::new(
            Opts::new("gateway_tokens_total", "Tokens billed per provider"),
            &["provider"],
        )?;
        let credit_resolutions = IntCounterVec::new(
            Opts::new(
                "gateway_credit_resolutions_total",
                "Credit reservations resolved, by resolution",
            ),
            &["resolution"],
        )?;
        let fallbacks_total = IntCounterVec::new(
            Opts::new("gateway_fallbacks_total", "Fallback attempts between providers"),
            &["from", "to"],
        )?;
        let stream_chunks = IntCounter::new(
            "gateway_stream_chunks_total",
            "SSE chunks relayed to callers",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(credit_resolutions.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(stream_chunks.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            tokens_total,
            credit_resolutions,
            fallbacks_total,
            stream_chunks,
        })
    }

    /// Record a finished request
    pub fn record_request(&self, model: &str, provider: &str, outcome: &str, streaming: bool, duration: Duration) {
        self.requests_total
            .with_label_values(&[model, provider, outcome])
            .inc();
        self.request_duration
            .with_label_values(&[model, if streaming { "true" } else { "false" }])
            .observe(duration.as_secs_f64());
    }

    /// Record billed tokens
    pub fn record_tokens(&self, provider: &str, tokens: u64) {
        self.tokens_total.with_label_values(&[provider]).inc_by(tokens);
    }

    /// Record a reservation resolution (`debited` or `released`)
    pub fn record_credit_resolution(&self, resolution: &str) {
        self.credit_resolutions.with_label_values(&[resolution]).inc();
    }

    /// Record a fallback attempt
    pub fn record_fallback(&self, from: &str, to: &str) {
        self.fallbacks_total.with_label_values(&[from, to]).inc();
    }

    /// Record relayed stream chunks
    pub fn record_stream_chunks(&self, chunks: u64) {
        self.stream_chunks.inc_by(chunks);
    }

    /// Render all metrics in the Prometheus text format
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn render(&self) -> Result<String, MetricsError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}
