//! # Gateway Server
//!
//! HTTP server for the IAFactory LLM gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with graceful shutdown
//! - OpenAI-compatible endpoints (`/v1/chat/completions`, `/v1/models`)
//! - API key authentication
//! - The request pipeline: rate limit, validate, reserve, route, execute,
//!   resolve
//! - Server-sent events relay for streamed completions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod relay;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use auth::{hash_api_key, ApiKeyAuthenticator, Authenticator};
pub use error::ApiError;
pub use lifecycle::{Lifecycle, RequestState};
pub use relay::{relay, ChannelSink, RelayEnd, RelayOutcome, SinkClosed, SseRelay, SseSink};
pub use routes::create_router;
pub use server::{shutdown_signal, Server, ServerConfig, ServerError};
pub use state::{router_config, AppState, AppStateBuilder};
