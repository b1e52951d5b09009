//! Gateway configuration types.
//!
//! The configuration is resolved once at process start and shared
//! read-only afterwards.

use gateway_core::{CallerRole, Pricing};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_provider_graph"))]
pub struct GatewayConfig {
    /// HTTP server settings
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerSettings,

    /// Upstream providers, in fallback order
    #[serde(default)]
    #[validate(nested)]
    pub providers: Vec<ProviderSettings>,

    /// Per-model pricing overrides
    #[serde(default)]
    pub pricing: HashMap<String, Pricing>,

    /// Credit reservation settings
    #[serde(default)]
    #[validate(nested)]
    pub billing: BillingSettings,

    /// Caller authentication settings
    #[serde(default)]
    #[validate(nested)]
    pub auth: AuthSettings,

    /// Per-caller rate limiting
    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitSettings,

    /// Upstream time budgets
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl GatewayConfig {
    /// Look up a provider by ID
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Enabled providers in declaration order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

fn validate_provider_graph(config: &GatewayConfig) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for provider in &config.providers {
        if !seen.insert(provider.id.as_str()) {
            let mut err = ValidationError::new("duplicate_provider");
            err.message = Some(format!("provider '{}' is declared twice", provider.id).into());
            return Err(err);
        }
    }

    for provider in &config.providers {
        if let Some(fallback) = provider.fallback.as_deref() {
            if fallback == provider.id {
                let mut err = ValidationError::new("self_fallback");
                err.message =
                    Some(format!("provider '{}' cannot fall back to itself", provider.id).into());
                return Err(err);
            }
            if !seen.contains(fallback) {
                let mut err = ValidationError::new("unknown_fallback");
                err.message = Some(
                    format!("provider '{}' falls back to unknown '{fallback}'", provider.id).into(),
                );
                return Err(err);
            }
        }
    }
    Ok(())
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerSettings {
    /// Bind address
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Maximum accepted request body size
    #[serde(default = "default_body_limit")]
    #[validate(range(min = 1024))]
    pub body_limit_bytes: usize,

    /// Time allowed for in-flight requests during shutdown
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Upstream provider settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProviderSettings {
    /// Provider ID, also used as a routing prefix
    #[validate(length(min = 1))]
    pub id: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Base URL of the OpenAI-compatible API (e.g. `https://api.groq.com/openai/v1`)
    #[validate(url)]
    pub base_url: String,

    /// Inline API key
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Advertised models (exact match)
    #[serde(default)]
    pub models: Vec<String>,

    /// Extra routing prefixes
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Default price for this provider's models
    #[serde(default)]
    pub pricing: Pricing,

    /// Explicit fallback provider ID
    #[serde(default)]
    pub fallback: Option<String>,

    /// Whether the provider is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// What to do with a reservation when a stream fails after emitting output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialUsagePolicy {
    /// Release the whole reservation
    Release,
    /// Debit the tokens consumed so far
    #[default]
    DebitConsumed,
}

/// Credit reservation settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BillingSettings {
    /// Pricing used for estimates when the model has no override
    #[serde(default = "default_pricing")]
    pub default_pricing: Pricing,

    /// Completion budget assumed when `max_tokens` is absent
    #[serde(default = "default_completion_tokens")]
    #[validate(range(min = 1))]
    pub default_completion_tokens: u64,

    /// Resolution of reservations for failed or abandoned streams
    #[serde(default)]
    pub on_stream_failure: PartialUsagePolicy,

    /// Opening balances for the in-memory ledger
    #[serde(default)]
    #[validate(nested)]
    pub accounts: Vec<AccountSettings>,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            default_pricing: default_pricing(),
            default_completion_tokens: default_completion_tokens(),
            on_stream_failure: PartialUsagePolicy::default(),
            accounts: Vec::new(),
        }
    }
}

/// Opening balance for one caller
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AccountSettings {
    /// Caller ID
    #[validate(length(min = 1))]
    pub caller_id: String,
    /// Balance in credits
    pub balance: u64,
}

/// Caller authentication settings
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AuthSettings {
    /// Accepted API keys
    #[serde(default)]
    #[validate(nested)]
    pub api_keys: Vec<ApiKeySettings>,

    /// Keys are stored as SHA-256 hex digests
    #[serde(default)]
    pub hash_keys: bool,
}

/// One accepted API key and the identity it maps to
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApiKeySettings {
    /// Key (or its SHA-256 hex digest when `hash_keys` is set)
    pub key: SecretString,
    /// Caller ID
    #[validate(length(min = 1))]
    pub caller_id: String,
    /// Organization ID
    #[validate(length(min = 1))]
    pub organization_id: String,
    /// Caller role
    #[serde(default)]
    pub role: CallerRole,
}

/// Per-caller rate limiting
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateLimitSettings {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Window length
    #[serde(default = "default_rate_window", with = "humantime_serde")]
    pub window: Duration,

    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    #[validate(range(min = 1))]
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_rate_window(),
            max_requests: default_max_requests(),
        }
    }
}

/// Upstream time budgets
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutSettings {
    /// Wait for the upstream's first byte
    #[serde(default = "default_first_byte_timeout", with = "humantime_serde")]
    pub first_byte: Duration,

    /// Maximum silence between streamed chunks
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle: Duration,

    /// Budget for a complete buffered response
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            first_byte: default_first_byte_timeout(),
            idle: default_idle_timeout(),
            request: default_request_timeout(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_pricing() -> Pricing {
    Pricing::per_1k_tokens(1)
}

fn default_completion_tokens() -> u64 {
    1024
}

fn default_rate_window() -> Duration {
    Duration::from_secs(60)
}

fn default_max_requests() -> u32 {
    60
}

fn default_first_byte_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_log_level() -> String {
    "info".to_string()
}
