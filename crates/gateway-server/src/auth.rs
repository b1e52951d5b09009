//! Caller authentication.
//!
//! The gateway only needs a [`CallerIdentity`] per request; where it comes
//! from is behind the [`Authenticator`] trait. The bundled implementation
//! checks static API keys from configuration.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use gateway_config::AuthSettings;
use gateway_core::{CallerIdentity, GatewayError};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::debug;

/// Header carrying a raw API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolves the caller of a request
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate the request described by `headers`
    async fn authenticate(&self, headers: &HeaderMap) -> Result<CallerIdentity, GatewayError>;
}

/// Static API key authenticator.
///
/// Keys are accepted from `Authorization: Bearer <key>` or `X-API-Key`.
/// With hashing enabled the configured keys are SHA-256 hex digests and
/// presented keys are hashed before lookup.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, CallerIdentity>,
    hash_keys: bool,
}

impl ApiKeyAuthenticator {
    /// Create an authenticator with no keys
    #[must_use]
    pub fn new(hash_keys: bool) -> Self {
        Self {
            keys: HashMap::new(),
            hash_keys,
        }
    }

    /// Build from the `auth` configuration section
    #[must_use]
    pub fn from_settings(settings: &AuthSettings) -> Self {
        settings
            .api_keys
            .iter()
            .fold(Self::new(settings.hash_keys), |auth, key| {
                auth.with_key(
                    key.key.expose_secret().as_str(),
                    CallerIdentity::new(&key.caller_id, &key.organization_id, key.role),
                )
            })
    }

    /// Register a key (a digest when hashing is enabled)
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>, caller: CallerIdentity) -> Self {
        self.keys.insert(key.into(), caller);
        self
    }

    /// Number of registered keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lookup(&self, presented: &str) -> Option<&CallerIdentity> {
        if self.hash_keys {
            self.keys.get(&hash_api_key(presented))
        } else {
            self.keys.get(presented)
        }
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<CallerIdentity, GatewayError> {
        let key = presented_key(headers)
            .ok_or_else(|| GatewayError::authentication("missing API key"))?;

        let caller = self
            .lookup(key)
            .cloned()
            .ok_or_else(|| GatewayError::authentication("invalid API key"))?;

        debug!(caller_id = %caller.id, organization_id = %caller.organization_id, "Caller authenticated");
        Ok(caller)
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .filter(|key| !key.is_empty())
}

/// SHA-256 hex digest of an API key, the stored form when hashing is enabled
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(key.as_bytes()))
}
