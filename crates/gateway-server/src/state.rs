//! Shared application state.

use gateway_billing::{CreditLedger, InMemoryLedger, PriceBook};
use gateway_config::{GatewayConfig, TimeoutSettings};
use gateway_core::{GatewayError, GatewayResult};
use gateway_providers::{OpenAICompatTransport, ProviderRegistry};
use gateway_resilience::{RateLimiter, RateLimiterConfig};
use gateway_routing::{Router, RouterConfig};
use gateway_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{ApiKeyAuthenticator, Authenticator};

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration
    pub config: Arc<GatewayConfig>,
    /// Provider router
    pub router: Arc<Router>,
    /// Credit ledger
    pub ledger: Arc<dyn CreditLedger>,
    /// Reservation estimates and charges
    pub price_book: Arc<PriceBook>,
    /// Caller authentication
    pub authenticator: Arc<dyn Authenticator>,
    /// Per-caller rate limiter, if enabled
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Prometheus metrics
    pub metrics: Metrics,
    started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.router.registry().len())
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Build the default state for `config`
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        Self::builder().config(config).build()
    }

    /// Time since the state was built
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Router time budgets from the `timeouts` configuration section
#[must_use]
pub fn router_config(timeouts: &TimeoutSettings) -> RouterConfig {
    RouterConfig {
        first_byte_timeout: timeouts.first_byte,
        idle_timeout: timeouts.idle,
        request_timeout: timeouts.request,
    }
}

/// Builder for [`AppState`].
///
/// Every collaborator not supplied explicitly is built from the configuration.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    router: Option<Router>,
    ledger: Option<Arc<dyn CreditLedger>>,
    price_book: Option<PriceBook>,
    authenticator: Option<Arc<dyn Authenticator>>,
    rate_limiter: Option<Option<RateLimiter>>,
    metrics: Option<Metrics>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the router
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Set the credit ledger
    #[must_use]
    pub fn ledger(mut self, ledger: Arc<dyn CreditLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the price book
    #[must_use]
    pub fn price_book(mut self, price_book: PriceBook) -> Self {
        self.price_book = Some(price_book);
        self
    }

    /// Set the authenticator
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Set the rate limiter (`None` disables rate limiting)
    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Set the metrics
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns error if the HTTP transport or the metrics registry cannot be
    /// created
    pub fn build(self) -> GatewayResult<AppState> {
        let config = self.config.unwrap_or_default();

        let router = match self.router {
            Some(router) => router,
            None => {
                let transport = Arc::new(OpenAICompatTransport::new()?);
                let registry =
                    ProviderRegistry::from_settings(&config.providers, transport, |var| {
                        std::env::var(var).ok()
                    });
                Router::new(Arc::new(registry), router_config(&config.timeouts))
            }
        };

        let ledger = self.ledger.unwrap_or_else(|| {
            let ledger = config
                .billing
                .accounts
                .iter()
                .fold(InMemoryLedger::new(), |ledger, account| {
                    ledger.with_account(&account.caller_id, account.balance)
                });
            Arc::new(ledger)
        });

        let price_book = self.price_book.unwrap_or_else(|| {
            PriceBook::new(
                config.billing.default_pricing,
                config.billing.default_completion_tokens,
            )
            .with_models(config.pricing.clone())
        });

        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(ApiKeyAuthenticator::from_settings(&config.auth)));

        let rate_limiter = self.rate_limiter.unwrap_or_else(|| {
            config.rate_limit.enabled.then(|| {
                RateLimiter::new(RateLimiterConfig {
                    window: config.rate_limit.window,
                    max_requests: config.rate_limit.max_requests,
                })
            })
        });

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new().map_err(|e| GatewayError::internal(e.to_string()))?,
        };

        Ok(AppState {
            config: Arc::new(config),
            router: Arc::new(router),
            ledger,
            price_book: Arc::new(price_book),
            authenticator,
            rate_limiter: rate_limiter.map(Arc::new),
            metrics,
            started_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::{AccountSettings, ProviderSettings};
    use gateway_core::Pricing;

    #[test]
    fn test_default_state() {
        let state = AppState::from_config(GatewayConfig::default()).expect("state");
        assert!(state.router.registry().is_empty());
        assert!(state.rate_limiter.is_some());
    }

    #[test]
    fn test_state_from_config() {
        let mut config = GatewayConfig::default();
        config.providers.push(ProviderSettings {
            id: "groq".to_string(),
            description: "Groq".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            api_key_env: None,
            models: vec!["llama-3.1-8b-instant".to_string()],
            prefixes: Vec::new(),
            pricing: Pricing::per_1k_tokens(2),
            fallback: None,
            enabled: true,
        });
        config.billing.accounts.push(AccountSettings {
            caller_id: "user-1".to_string(),
            balance: 500,
        });
        config.rate_limit.enabled = false;

        let state = AppState::from_config(config).expect("state");
        assert_eq!(state.router.registry().len(), 1);
        assert!(state.rate_limiter.is_none());
    }
}
