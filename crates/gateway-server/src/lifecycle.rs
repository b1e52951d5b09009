//! Per-request lifecycle tracking.
//!
//! `Received → Validated → Reserved → Routed → Completed | Failed`

use gateway_core::GatewayError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stage reached by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    /// Accepted by the server
    Received,
    /// Body passed validation
    Validated,
    /// Credits reserved
    Reserved,
    /// Provider selected
    Routed,
    /// Served and debited
    Completed,
    /// Terminated with an error
    Failed,
}

impl RequestState {
    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Reserved => "reserved",
            Self::Routed => "routed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle of one request
#[derive(Debug)]
pub struct Lifecycle {
    request_id: String,
    state: RequestState,
    started: Instant,
}

impl Lifecycle {
    /// Start tracking a received request
    pub fn new(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        debug!(request_id = %request_id, state = "received", "Request lifecycle");
        Self {
            request_id,
            state: RequestState::Received,
            started: Instant::now(),
        }
    }

    /// Request ID
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Time since the request was received
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move forward to `next`. Backward moves and moves out of a terminal
    /// state are ignored.
    pub fn advance(&mut self, next: RequestState) {
        if self.state.is_terminal() || next <= self.state {
            warn!(
                request_id = %self.request_id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Ignoring invalid lifecycle transition"
            );
            return;
        }
        debug!(
            request_id = %self.request_id,
            from = self.state.as_str(),
            state = next.as_str(),
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Request lifecycle"
        );
        self.state = next;
    }

    /// Terminate successfully
    pub fn complete(&mut self) {
        self.advance(RequestState::Completed);
    }

    /// Terminate with `error`
    pub fn fail(&mut self, error: &GatewayError) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            request_id = %self.request_id,
            from = self.state.as_str(),
            state = "failed",
            kind = error.kind(),
            error = %error,
            "Request lifecycle"
        );
        self.state = RequestState::Failed;
    }

    /// Pass `result` through, failing the lifecycle on error
    pub fn check<T>(&mut self, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }
}
