//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use gateway_core::CallerIdentity;
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// Header carrying the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extract request ID from headers or generate one
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    /// Read the request ID from `parts`, falling back to a new UUID v4
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .or_else(|| parts.headers.get("x-correlation-id"))
            .or_else(|| parts.headers.get("request-id"))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);
        Self(id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.authenticator.authenticate(&parts.headers).await {
            Ok(caller) => Ok(Self(caller)),
            Err(e) => {
                debug!(path = %parts.uri.path(), error = %e, "Authentication rejected");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_request_id_from_header() {
        let req = Request::builder()
            .uri("/test")
            .header("x-request-id", "req-123")
            .body(())
            .expect("valid request");
        let (parts, _body) = req.into_parts();
        assert_eq!(RequestId::from_parts(&parts).0, "req-123");
    }

    #[test]
    fn test_request_id_from_correlation_header() {
        let req = Request::builder()
            .uri("/test")
            .header("x-correlation-id", "corr-9")
            .body(())
            .expect("valid request");
        let (parts, _body) = req.into_parts();
        assert_eq!(RequestId::from_parts(&parts).0, "corr-9");
    }

    #[test]
    fn test_request_id_generated() {
        let req = Request::builder().uri("/test").body(()).expect("valid request");
        let (parts, _body) = req.into_parts();
        let id = RequestId::from_parts(&parts).0;
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
