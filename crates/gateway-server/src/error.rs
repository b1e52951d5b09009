//! API error responses.
//!
//! Every failure leaving the server is rendered as
//! `{"error": {"type", "message"}, "details"?, "status"}`.

use axum::{
    extract::rejection::BytesRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde_json::{json, Value};
use std::time::Duration;

/// Error returned by handlers and extractors
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Stable error kind (`validation_error`, `upstream_timeout`, ...)
    pub kind: &'static str,
    /// Human-readable message
    pub message: String,
    /// Structured details
    pub details: Option<Value>,
    /// Value for the `Retry-After` header
    pub retry_after: Option<Duration>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// JSON error body, also used for the SSE error-terminal frame
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            },
            "status": self.status.as_u16(),
        });
        if let Some(details) = &self.details {
            body["details"] = details.clone();
        }
        body
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &err {
            GatewayError::RateLimited { retry_after } => *retry_after,
            _ => None,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
            details: err.details(),
            retry_after,
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        let status = rejection.status();
        let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "validation_error"
        };
        let mut err = Self::new(status, kind, rejection.body_text());
        err.details = Some(json!({ "field": "body" }));
        err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        let mut response = (self.status, Json(body)).into_response();
        if let Some(after) = self.retry_after {
            // Round up so clients never retry inside the window
            let secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_validation_error() {
        let err = ApiError::from(GatewayError::validation("temperature", "must be between 0 and 2"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let body = err.body();
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(body["details"]["field"], "temperature");
        assert_eq!(body["status"], 400);
    }

    #[test]
    fn test_body_omits_empty_details() {
        let body = ApiError::from(GatewayError::authentication("missing API key")).body();
        assert!(body.get("details").is_none());
        assert_eq!(body["status"], 401);
    }

    #[test]
    fn test_retry_after_header() {
        let err = ApiError::from(GatewayError::RateLimited {
            retry_after: Some(Duration::from_millis(2_500)),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("3")
        );
    }

    #[test]
    fn test_upstream_statuses() {
        let answered = ApiError::from(GatewayError::upstream("groq", "bad gateway", Some(500), false));
        assert_eq!(answered.status, StatusCode::BAD_GATEWAY);
        let silent = ApiError::from(GatewayError::upstream("groq", "refused", None, false));
        assert_eq!(silent.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
