//! Scoped ownership of a credit reservation.

use crate::ledger::{Charge, CreditLedger, Reservation};
use gateway_core::GatewayResult;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a guarded reservation was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Actual cost was debited
    Debited,
    /// Hold was released
    Released,
}

impl Resolution {
    /// Label used in logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debited => "debited",
            Self::Released => "released",
        }
    }
}

/// Owns one reservation until it is debited or released.
///
/// `debit` and `release` consume the guard, so a reservation can be
/// resolved at most once through it. A guard dropped without being resolved
/// (for example when the request future is cancelled by a client disconnect)
/// spawns a release on the current Tokio runtime.
pub struct ReservationGuard {
    ledger: Arc<dyn CreditLedger>,
    reservation: Reservation,
    resolved: bool,
}

impl ReservationGuard {
    /// Reserve `estimated` credits and wrap the result in a guard.
    ///
    /// # Errors
    ///
    /// Propagates the ledger's reservation error.
    pub async fn reserve(
        ledger: Arc<dyn CreditLedger>,
        caller: &gateway_core::CallerIdentity,
        model: &str,
        estimated: u64,
    ) -> GatewayResult<Self> {
        let reservation = ledger.reserve(caller, model, estimated).await?;
        debug!(
            reservation_id = %reservation.id,
            caller_id = %reservation.caller_id,
            amount = reservation.estimated_amount,
            "Credits reserved"
        );
        Ok(Self::new(ledger, reservation))
    }

    /// Wrap an existing reservation
    pub fn new(ledger: Arc<dyn CreditLedger>, reservation: Reservation) -> Self {
        Self {
            ledger,
            reservation,
            resolved: false,
        }
    }

    /// The guarded reservation
    #[must_use]
    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    /// Debit the actual cost.
    ///
    /// If the ledger rejects the debit the guard stays unresolved and is
    /// released on drop.
    pub async fn debit(mut self, charge: Charge) -> GatewayResult<Resolution> {
        self.ledger.debit(&self.reservation, charge).await?;
        self.resolved = true;
        debug!(
            reservation_id = %self.reservation.id,
            tokens = charge.total_tokens,
            amount = charge.amount,
            "Reservation debited"
        );
        Ok(Resolution::Debited)
    }

    /// Release the hold
    pub async fn release(mut self) -> GatewayResult<Resolution> {
        self.resolved = true;
        self.ledger.release(&self.reservation).await?;
        debug!(reservation_id = %self.reservation.id, "Reservation released");
        Ok(Resolution::Released)
    }
}

impl std::fmt::Debug for ReservationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationGuard")
            .field("reservation", &self.reservation)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        let ledger = Arc::clone(&self.ledger);
        let reservation = self.reservation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(reservation_id = %reservation.id, "Releasing abandoned reservation");
                handle.spawn(async move {
                    if let Err(e) = ledger.release(&reservation).await {
                        warn!(
                            reservation_id = %reservation.id,
                            error = %e,
                            "Failed to release abandoned reservation"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    reservation_id = %reservation.id,
                    "Reservation dropped outside a runtime; hold not released"
                );
            }
        }
    }
}
