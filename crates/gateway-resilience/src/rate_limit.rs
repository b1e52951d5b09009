//! Fixed-window request rate limiting per caller.

use dashmap::DashMap;
use gateway_core::GatewayError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Window length
    pub window: Duration,
    /// Requests allowed per window
    pub max_requests: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per key in fixed windows
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Count one request for `key`.
    ///
    /// # Errors
    /// Returns [`GatewayError::RateLimited`] with the time left in the current
    /// window when `key` has used up its allowance.
    pub fn check(&self, key: &str) -> Result<(), GatewayError> {
        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.config.window {
            window.started = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(window.started));
            debug!(key = %key, count = window.count, "Rate limit exceeded");
            return Err(GatewayError::RateLimited {
                retry_after: Some(retry_after),
            });
        }

        window.count += 1;
        Ok(())
    }
}
