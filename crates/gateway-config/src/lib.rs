//! # Gateway Config
//!
//! Configuration for the IAFactory LLM gateway: provider profiles, pricing,
//! billing policy, API keys, rate limits, time budgets and logging.
//!
//! Configuration is read from a YAML, TOML or JSON file, then overridden by
//! `GATEWAY_*` environment variables, then validated.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod loader;

pub use config::{
    AccountSettings, ApiKeySettings, AuthSettings, BillingSettings, GatewayConfig, LogFormat,
    LoggingSettings, PartialUsagePolicy, ProviderSettings, RateLimitSettings, ServerSettings,
    TimeoutSettings,
};
pub use loader::{load_config, ConfigError, ConfigLoader, DEFAULT_ENV_PREFIX};
