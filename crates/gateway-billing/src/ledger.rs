//! The credit ledger contract.
//!
//! A successful [`CreditLedger::reserve`] must be followed by exactly one
//! terminal call, [`CreditLedger::debit`] or [`CreditLedger::release`].
//! Both terminal calls are idempotent: invoking either on a reservation that
//! is already resolved is a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_core::{CallerIdentity, GatewayResult};
use uuid::Uuid;

/// Provisional hold on a caller's credit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Reservation ID
    pub id: Uuid,
    /// Caller holding the credit
    pub caller_id: String,
    /// Caller organization
    pub organization_id: String,
    /// Requested model
    pub model: String,
    /// Credits held
    pub estimated_amount: u64,
    /// When the hold was placed
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a reservation for `caller`
    pub fn new(caller: &CallerIdentity, model: impl Into<String>, estimated_amount: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            caller_id: caller.id.clone(),
            organization_id: caller.organization_id.clone(),
            model: model.into(),
            estimated_amount,
            created_at: Utc::now(),
        }
    }
}

/// Actual cost of a completed (or partially completed) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    /// Tokens consumed
    pub total_tokens: u64,
    /// Credits to debit
    pub amount: u64,
}

/// System of record for caller credit
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Hold `estimated` credits for a request.
    ///
    /// # Errors
    ///
    /// Returns [`gateway_core::GatewayError::InsufficientCredits`] when the
    /// caller's available balance is below the estimate.
    async fn reserve(
        &self,
        caller: &CallerIdentity,
        model: &str,
        estimated: u64,
    ) -> GatewayResult<Reservation>;

    /// Charge the actual cost and drop the hold
    async fn debit(&self, reservation: &Reservation, charge: Charge) -> GatewayResult<()>;

    /// Drop the hold without charging
    async fn release(&self, reservation: &Reservation) -> GatewayResult<()>;
}
