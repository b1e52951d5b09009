//! Error taxonomy for the gateway.
//!
//! Every failure raised while serving a request is classified into one of
//! these variants. Each variant maps to a stable `kind` string and an HTTP
//! status so the responder can render a consistent error body.

use std::time::Duration;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Stage of the upstream exchange that exceeded its time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Waiting for the upstream's first byte (connection establishment)
    FirstByte,
    /// Waiting between two consecutive streamed chunks
    Idle,
    /// Waiting for a complete buffered response
    Request,
}

impl std::fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstByte => write!(f, "first_byte"),
            Self::Idle => write!(f, "idle"),
            Self::Request => write!(f, "request"),
        }
    }
}

/// Gateway error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Request body failed schema validation
    #[error("Invalid value for '{field}': {reason}")]
    Validation {
        /// Offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Caller could not be authenticated
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// Caller does not hold enough credit for the estimated cost
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        /// Estimated cost of the request
        required: u64,
        /// Credits available to the caller
        available: u64,
    },

    /// No provider serves the requested model
    #[error("Model not found: {model}")]
    ModelNotFound {
        /// Requested model
        model: String,
    },

    /// Caller exceeded the request rate limit
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Time until the current window resets
        retry_after: Option<Duration>,
    },

    /// Upstream provider could not serve the request
    #[error("Upstream provider '{provider}' unavailable: {message}")]
    UpstreamUnavailable {
        /// Provider ID
        provider: String,
        /// Error message
        message: String,
        /// HTTP status returned by the upstream, if it answered
        status_code: Option<u16>,
        /// Whether another provider may be tried
        retryable: bool,
    },

    /// Upstream provider did not answer in time
    #[error("Upstream provider '{provider}' timed out ({stage}) after {timeout:?}")]
    UpstreamTimeout {
        /// Provider ID
        provider: String,
        /// Stage that timed out
        stage: TimeoutStage,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an insufficient credits error
    #[must_use]
    pub fn insufficient_credits(required: u64, available: u64) -> Self {
        Self::InsufficientCredits {
            required,
            available,
        }
    }

    /// Create a model not found error
    pub fn model_not_found(model: impl Into<String>) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    /// Create an upstream unavailable error
    pub fn upstream(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::UpstreamUnavailable {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create an upstream timeout error
    pub fn upstream_timeout(
        provider: impl Into<String>,
        stage: TimeoutStage,
        timeout: Duration,
    ) -> Self {
        Self::UpstreamTimeout {
            provider: provider.into(),
            stage,
            timeout,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Authentication { .. } => 401,
            Self::InsufficientCredits { .. } => 402,
            Self::ModelNotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::UpstreamUnavailable { status_code, .. } => {
                if status_code.is_some() {
                    502
                } else {
                    503
                }
            }
            Self::UpstreamTimeout { .. } => 504,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Stable machine-readable error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Authentication { .. } => "auth_error",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Configuration { .. } | Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether the router may try the fallback provider after this error
    #[must_use]
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { retryable, .. } => *retryable,
            Self::UpstreamTimeout { stage, .. } => *stage == TimeoutStage::FirstByte,
            _ => false,
        }
    }

    /// Whether the error was caused by the client
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Structured details for the error body, if any
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, reason } => Some(serde_json::json!({
                "field": field,
                "reason": reason,
            })),
            Self::InsufficientCredits {
                required,
                available,
            } => Some(serde_json::json!({
                "required": required,
                "available": available,
            })),
            Self::RateLimited {
                retry_after: Some(after),
            } => Some(serde_json::json!({ "retry_after_seconds": after.as_secs() })),
            Self::UpstreamTimeout { stage, timeout, .. } => Some(serde_json::json!({
                "stage": stage.to_string(),
                "timeout_ms": timeout.as_millis() as u64,
            })),
            _ => None,
        }
    }
}
