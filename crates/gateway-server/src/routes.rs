//! Route definitions for the gateway API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Chat and model catalog under /v1
        .nest("/v1", openai_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer())
        .with_state(state)
}

/// Authenticated `/v1` routes
fn openai_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(handlers::chat_completion))
        .route("/models", get(handlers::list_models))
        .route("/models/:model_id", get(handlers::get_model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use gateway_config::GatewayConfig;
    use tower::ServiceExt;

    async fn send(method: &str, uri: &str) -> Response {
        let state = AppState::from_config(GatewayConfig::default()).expect("state");
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        create_router(state).oneshot(request).await.expect("response")
    }

    #[tokio::test]
    async fn test_public_endpoints() {
        for uri in ["/health", "/metrics"] {
            let response = send("GET", uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert!(response.headers().contains_key("x-request-id"));
        }
    }

    #[tokio::test]
    async fn test_api_endpoints_require_credentials() {
        assert_eq!(send("GET", "/v1/models").await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(send("GET", "/v1/models/gpt-4o").await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            send("POST", "/v1/chat/completions").await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_unrouted_paths() {
        assert_eq!(send("GET", "/v1/embeddings").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            send("GET", "/v1/chat/completions").await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
