//! Validated domain types (newtypes).
//!
//! Numeric sampling parameters are only constructible through their
//! range-checked constructors, so a value of one of these types is always
//! within its declared bounds.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

macro_rules! bounded_float {
    ($(#[$meta:meta])* $name:ident, $field:literal, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(f32);

        impl $name {
            /// Lower bound (inclusive)
            pub const MIN: f32 = $min;
            /// Upper bound (inclusive)
            pub const MAX: f32 = $max;

            /// Create a new value, rejecting anything outside the bounds
            ///
            /// # Errors
            /// Returns a validation error naming the field if out of range
            pub fn new(value: f64) -> Result<Self, GatewayError> {
                if !value.is_finite() || value < f64::from(Self::MIN) || value > f64::from(Self::MAX) {
                    return Err(GatewayError::validation(
                        $field,
                        format!("must be between {} and {}, got {}", Self::MIN, Self::MAX, value),
                    ));
                }
                Ok(Self(value as f32))
            }

            /// Get the inner value
            #[must_use]
            pub fn value(self) -> f32 {
                self.0
            }
        }
    };
}

bounded_float!(
    /// Sampling temperature in `[0, 2]`
    Temperature,
    "temperature",
    0.0,
    2.0
);

bounded_float!(
    /// Nucleus sampling parameter in `[0, 1]`
    TopP,
    "top_p",
    0.0,
    1.0
);

bounded_float!(
    /// Frequency penalty in `[-2, 2]`
    FrequencyPenalty,
    "frequency_penalty",
    -2.0,
    2.0
);

bounded_float!(
    /// Presence penalty in `[-2, 2]`
    PresencePenalty,
    "presence_penalty",
    -2.0,
    2.0
);

/// Maximum number of tokens to generate (positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxTokens(u32);

impl MaxTokens {
    /// Upper bound accepted by the gateway
    pub const MAX: u32 = 1_000_000;

    /// Create a new value
    ///
    /// # Errors
    /// Returns a validation error if the value is not in `1..=MAX`
    pub fn new(value: i64) -> Result<Self, GatewayError> {
        if value < 1 {
            return Err(GatewayError::validation(
                "max_tokens",
                format!("must be a positive integer, got {value}"),
            ));
        }
        if value > i64::from(Self::MAX) {
            return Err(GatewayError::validation(
                "max_tokens",
                format!("must not exceed {}, got {value}", Self::MAX),
            ));
        }
        Ok(Self(value as u32))
    }

    /// Get the inner value
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Model identifier requested by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    /// Maximum accepted length
    pub const MAX_LEN: usize = 256;

    /// Create a new model ID
    ///
    /// # Errors
    /// Returns a validation error if empty, too long, or containing whitespace
    pub fn new(value: impl Into<String>) -> Result<Self, GatewayError> {
        let value = value.into();
        if value.is_empty() {
            return Err(GatewayError::validation("model", "must not be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(GatewayError::validation(
                "model",
                format!("must be at most {} characters", Self::MAX_LEN),
            ));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GatewayError::validation(
                "model",
                "must not contain whitespace or control characters",
            ));
        }
        Ok(Self(value))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    /// Organization administrator
    Admin,
    /// Regular member
    #[default]
    Member,
    /// Machine-to-machine service account
    Service,
}

/// Identity of the caller, supplied by the authentication collaborator.
///
/// The gateway treats it as opaque context threaded through credit and
/// routing decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Caller ID
    pub id: String,
    /// Organization the caller belongs to
    pub organization_id: String,
    /// Caller role
    pub role: CallerRole,
}

impl CallerIdentity {
    /// Create a new caller identity
    pub fn new(id: impl Into<String>, organization_id: impl Into<String>, role: CallerRole) -> Self {
        Self {
            id: id.into(),
            organization_id: organization_id.into(),
            role,
        }
    }
}
