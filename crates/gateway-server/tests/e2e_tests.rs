//! End-to-end tests for the gateway HTTP surface.
//!
//! The axum router is driven with `oneshot`, providers are replaced by the
//! scripted transport and credits by the in-memory ledger, so every ledger
//! and provider call can be asserted on.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use gateway_billing::{InMemoryLedger, LedgerCall, PriceBook};
use gateway_config::{GatewayConfig, PartialUsagePolicy};
use gateway_core::{CallerIdentity, CallerRole, GatewayError, Pricing, ProviderProfile, ProviderTransport};
use gateway_providers::testing::{Script, ScriptedResponse, ScriptedTransport};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{RateLimiter, RateLimiterConfig};
use gateway_routing::{Router, RouterConfig};
use gateway_server::{create_router, ApiKeyAuthenticator, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const USER_KEY: &str = "sk-user";
const BROKE_KEY: &str = "sk-broke";

struct Harness {
    app: axum::Router,
    ledger: Arc<InMemoryLedger>,
    transport: Arc<ScriptedTransport>,
    state: AppState,
}

struct HarnessBuilder {
    transport: ScriptedTransport,
    config: GatewayConfig,
    router_config: RouterConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HarnessBuilder {
    fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport,
            config: GatewayConfig::default(),
            router_config: RouterConfig::default(),
            rate_limiter: None,
        }
    }

    fn policy(mut self, policy: PartialUsagePolicy) -> Self {
        self.config.billing.on_stream_failure = policy;
        self
    }

    fn idle_timeout(mut self, idle: Duration) -> Self {
        self.router_config.idle_timeout = idle;
        self
    }

    fn body_limit(mut self, bytes: usize) -> Self {
        self.config.server.body_limit_bytes = bytes;
        self
    }

    fn rate_limit(mut self, max_requests: u32) -> Self {
        self.rate_limiter = Some(RateLimiter::new(RateLimiterConfig {
            window: Duration::from_secs(60),
            max_requests,
        }));
        self
    }

    fn build(self) -> Harness {
        let transport = Arc::new(self.transport);
        let dyn_transport: Arc<dyn ProviderTransport> = transport.clone();

        let registry = ProviderRegistry::builder()
            .register(provider("gpt", 2).with_model("gpt-4o"), Arc::clone(&dyn_transport))
            .register(
                provider("deepseek", 1).with_fallback("openrouter"),
                Arc::clone(&dyn_transport),
            )
            .register(provider("openrouter", 10), Arc::clone(&dyn_transport))
            .build();

        let ledger = Arc::new(InMemoryLedger::new()
                .with_recording()
                .with_account("user-1", 1_000_000));
        let authenticator = ApiKeyAuthenticator::new(false)
            .with_key(USER_KEY, CallerIdentity::new("user-1", "org-1", CallerRole::Member))
            .with_key(BROKE_KEY, CallerIdentity::new("user-2", "org-1", CallerRole::Member));

        let state = AppState::builder()
            .config(self.config)
            .router(Router::new(Arc::new(registry), self.router_config))
            .ledger(ledger.clone())
            .price_book(
                PriceBook::new(Pricing::per_1k_tokens(1), 100)
                    .with_model("gpt-4o", Pricing::per_1k_tokens(5)),
            )
            .authenticator(Arc::new(authenticator))
            .rate_limiter(self.rate_limiter)
            .build()
            .expect("state");

        Harness {
            app: create_router(state.clone()),
            ledger,
            transport,
            state,
        }
    }
}

fn provider(id: &str, per_1k: u64) -> ProviderProfile {
    ProviderProfile::new(id, format!("https://{id}.example.com/v1"), Pricing::per_1k_tokens(per_1k))
        .with_api_key("upstream-key")
}

fn chat_request(key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

fn hello(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "hi"}],
        "stream": stream,
    })
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn sse_frames(response: axum::response::Response) -> Vec<String> {
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(String::from)
        .collect()
}

fn debits(ledger: &InMemoryLedger) -> Vec<(u64, u64)> {
    ledger
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            LedgerCall::Debit {
                total_tokens,
                amount,
                ..
            } => Some((total_tokens, amount)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod health_endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness.app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_string());
        assert!(json["uptime"].is_u64());
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();
        let response = harness.app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("req-42")
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_prometheus_text() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness.app.oneshot(get("/metrics", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }
}

#[cfg(test)]
mod models_endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_models_requires_auth() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();
        let response = harness.app.oneshot(get("/v1/models", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_models_applies_price_overrides() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness
            .app
            .oneshot(get("/v1/models", Some(USER_KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["object"], "list");
        let gpt4o = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["id"] == "gpt-4o")
            .expect("gpt-4o listed");
        assert_eq!(gpt4o["object"], "model");
        assert_eq!(gpt4o["owned_by"], "gpt");
        assert_eq!(gpt4o["pricing"]["per_1k_tokens"], 5);
    }

    #[tokio::test]
    async fn test_get_model() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let found = harness
            .app
            .clone()
            .oneshot(get("/v1/models/gpt-4o", Some(USER_KEY)))
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(json_body(found).await["id"], "gpt-4o");

        let missing = harness
            .app
            .oneshot(get("/v1/models/unknown-model", Some(USER_KEY)))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["error"]["type"], "model_not_found");
    }
}

#[cfg(test)]
mod chat_completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_debits_reported_usage() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(ScriptedResponse::text("Hello there").with_usage(12, 30)),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let json = json_body(response).await;
        assert_eq!(json["usage"]["total_tokens"], 42);
        assert_eq!(json["choices"][0]["message"]["content"], "Hello there");
        assert_eq!(json["provider"], "gpt");

        // gpt charges 2 credits per 1k tokens
        assert_eq!(debits(&harness.ledger), vec![(42, 1)]);
        assert_eq!(harness.ledger.reserve_count(), 1);
        assert_eq!(harness.ledger.release_count(), 0);
        assert_eq!(harness.ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_buffered_without_usage_debits_estimate() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(ScriptedResponse::text(
                "The quick brown fox jumps over the lazy dog, twice.",
            )),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["usage"]["total_tokens"], 14);

        // one prompt token for "hi", thirteen for the 51-character answer
        assert_eq!(debits(&harness.ledger), vec![(14, 1)]);
        assert!(harness.ledger.balance("user-1") < 1_000_000);
    }

    #[tokio::test]
    async fn test_client_disconnect_resolves_reservation_once() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(
                ScriptedResponse::deltas(["Hello", " there", " and", " more", " text"])
                    .with_chunk_delay(Duration::from_millis(200)),
            ),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let first = body.frame().await.expect("first frame").unwrap();
        let first = first.into_data().expect("data frame");
        assert!(String::from_utf8_lossy(&first).contains("\"Hello\""));
        drop(body);

        for _ in 0..40 {
            if harness.ledger.outstanding() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(harness.ledger.outstanding(), 0);
        assert_eq!(harness.ledger.debit_count() + harness.ledger.release_count(), 1);
        // the consumed "Hello" is billed under the default policy
        assert_eq!(debits(&harness.ledger), vec![(2, 1)]);
        assert_eq!(harness.transport.call_count("gpt"), 1);
    }

    #[tokio::test]
    async fn test_unrouted_models_share_one_metrics_label() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        for i in 0..50 {
            let response = harness
                .app
                .clone()
                .oneshot(chat_request(Some(USER_KEY), &hello(&format!("junk-model-{i}"), false)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let metrics = harness.state.metrics.render().unwrap();
        let series: Vec<_> = metrics
            .lines()
            .filter(|line| line.starts_with("gateway_requests_total{"))
            .collect();
        assert_eq!(series.len(), 1, "{series:?}");
        assert!(series[0].contains("model=\"unknown\""));
        assert!(series[0].ends_with(" 50"));
        assert!(!metrics.contains("junk-model"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_json_error() {
        let harness = HarnessBuilder::new(ScriptedTransport::new())
            .body_limit(64)
            .build();

        let mut body = hello("gpt-x", false);
        body["messages"][0]["content"] = Value::String("x".repeat(1_024));
        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "payload_too_large");
        assert_eq!(json["status"], 413);
        assert!(harness.ledger.calls().is_empty());
        assert!(harness.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_model_price_override_applies_to_charge() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(ScriptedResponse::text("ok").with_usage(1_000, 1_000)),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-4o", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(debits(&harness.ledger), vec![(2_000, 10)]);
    }

    #[tokio::test]
    async fn test_fixture_streams_from_prefix_matched_provider() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(ScriptedResponse::deltas(["Hel", "lo"]).with_usage(3, 4)),
        );
        let harness = HarnessBuilder::new(transport).build();

        let fixture =
            json!({"model":"gpt-x","messages":[{"role":"user","content":"hi"}],"stream":true});
        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &fixture))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );

        let frames = sse_frames(response).await;
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("data: ") && frames[0].contains("\"Hel\""));
        assert!(frames[1].contains("\"lo\""));
        assert_eq!(frames[2], "data: [DONE]");

        let calls = harness.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, "gpt");
        assert_eq!(debits(&harness.ledger), vec![(7, 1)]);
    }

    #[tokio::test]
    async fn test_stream_failure_after_two_chunks_debits_consumed() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(
                ScriptedResponse::deltas(["Hel", "lo ", "wor", "ld", "!"])
                    .fail_after(2, GatewayError::upstream("gpt", "connection reset", None, false)),
            ),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let frames = sse_frames(response).await;
        assert_eq!(frames.len(), 3);
        assert!(frames[..2].iter().all(|f| f.contains("chat.completion.chunk")));
        let error: Value = serde_json::from_str(frames[2].trim_start_matches("data: ")).unwrap();
        assert_eq!(error["error"]["type"], "upstream_unavailable");
        assert!(frames.iter().all(|f| !f.contains("[DONE]")));

        // "Hello " is six characters, estimated as two tokens
        assert_eq!(debits(&harness.ledger), vec![(2, 1)]);
        assert_eq!(harness.ledger.release_count(), 0);
        assert_eq!(harness.ledger.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_stream_failure_releases_under_release_policy() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(
                ScriptedResponse::deltas(["a", "b", "c", "d", "e"])
                    .fail_after(2, GatewayError::upstream("gpt", "connection reset", None, false)),
            ),
        );
        let harness = HarnessBuilder::new(transport)
            .policy(PartialUsagePolicy::Release)
            .build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", true)))
            .await
            .unwrap();
        let frames = sse_frames(response).await;
        assert_eq!(frames.len(), 3);

        assert_eq!(harness.ledger.release_count(), 1);
        assert_eq!(harness.ledger.debit_count(), 0);
        assert_eq!(harness.ledger.balance("user-1"), 1_000_000);
    }

    #[tokio::test]
    async fn test_stream_idle_timeout_ends_with_error_frame() {
        let transport = ScriptedTransport::new().with_script(
            "gpt",
            Script::Respond(
                ScriptedResponse::deltas(["first", "late"]).with_chunk_delay(Duration::from_secs(5)),
            ),
        );
        let harness = HarnessBuilder::new(transport)
            .idle_timeout(Duration::from_millis(100))
            .build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", true)))
            .await
            .unwrap();
        let frames = sse_frames(response).await;

        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("upstream_timeout"));
        assert!(frames[1].contains("\"status\":504"));
        assert_eq!(harness.ledger.debit_count() + harness.ledger.release_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_without_side_effects() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness
            .app
            .oneshot(chat_request(
                Some(USER_KEY),
                &json!({"model": "gpt-x", "messages": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "validation_error");
        assert_eq!(json["details"]["field"], "messages");
        assert_eq!(json["status"], 400);
        assert!(harness.ledger.calls().is_empty());
        assert!(harness.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_temperature_out_of_range() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let mut body = hello("gpt-x", false);
        body["temperature"] = json!(3.0);
        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["details"]["field"], "temperature");
        assert!(harness.transport.calls().is_empty());
        assert!(harness.ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header(header::AUTHORIZATION, format!("Bearer {USER_KEY}"))
            .body(Body::from("{not json"))
            .unwrap();
        let response = harness.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["details"]["field"], "body");
    }

    #[tokio::test]
    async fn test_fallback_bills_fallback_pricing() {
        let transport = ScriptedTransport::new()
            .with_script(
                "deepseek",
                Script::Fail(GatewayError::upstream("deepseek", "service unavailable", Some(503), true)),
            )
            .with_script(
                "openrouter",
                Script::Respond(ScriptedResponse::text("from fallback").with_usage(100, 900)),
            );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("deepseek-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["provider"], "openrouter");

        assert_eq!(harness.transport.call_count("deepseek"), 1);
        assert_eq!(harness.transport.call_count("openrouter"), 1);
        // openrouter charges 10 credits per 1k tokens
        assert_eq!(debits(&harness.ledger), vec![(1_000, 10)]);

        let metrics = harness.state.metrics.render().unwrap();
        assert!(metrics.contains("gateway_fallbacks_total{from=\"deepseek\",to=\"openrouter\"} 1"));
    }

    #[tokio::test]
    async fn test_exhausted_fallback_releases_reservation() {
        let transport = ScriptedTransport::new()
            .with_script(
                "deepseek",
                Script::Fail(GatewayError::upstream("deepseek", "service unavailable", Some(503), true)),
            )
            .with_script(
                "openrouter",
                Script::Fail(GatewayError::upstream("openrouter", "bad gateway", Some(502), true)),
            );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("deepseek-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(response).await["error"]["type"], "upstream_unavailable");

        assert_eq!(harness.transport.calls().len(), 2);
        assert_eq!(harness.ledger.release_count(), 1);
        assert_eq!(harness.ledger.debit_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_rejection_is_not_retried() {
        let transport = ScriptedTransport::new().with_script(
            "deepseek",
            Script::Fail(GatewayError::upstream("deepseek", "context too long", Some(400), false)),
        );
        let harness = HarnessBuilder::new(transport).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("deepseek-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(harness.transport.call_count("openrouter"), 0);
        assert_eq!(harness.ledger.release_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_model_releases_reservation() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("claude-3", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["type"], "model_not_found");
        assert_eq!(harness.ledger.reserve_count(), 1);
        assert_eq!(harness.ledger.release_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness
            .app
            .oneshot(chat_request(None, &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["type"], "auth_error");
        assert!(harness.ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_credits() {
        let harness = HarnessBuilder::new(ScriptedTransport::new()).build();

        let response = harness
            .app
            .oneshot(chat_request(Some(BROKE_KEY), &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "insufficient_credits");
        assert_eq!(json["details"]["available"], 0);
        assert!(harness.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_before_reservation() {
        let transport = ScriptedTransport::new()
            .with_script("gpt", Script::Respond(ScriptedResponse::text("ok")));
        let harness = HarnessBuilder::new(transport).rate_limit(1).build();

        let first = harness
            .app
            .clone()
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = harness
            .app
            .oneshot(chat_request(Some(USER_KEY), &hello("gpt-x", false)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(harness.ledger.reserve_count(), 1);
    }
}
