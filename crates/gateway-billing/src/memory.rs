//! In-memory credit ledger.
//!
//! Serves as the default ledger for single-instance deployments and as the
//! credit double in tests. Only unresolved reservations are kept; a
//! reservation is dropped as soon as it is debited or released. Call
//! recording is opt-in via [`InMemoryLedger::with_recording`].

use crate::ledger::{Charge, CreditLedger, Reservation};
use async_trait::async_trait;
use gateway_core::{CallerIdentity, GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// A call observed by a recording ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// `reserve` was called
    Reserve {
        /// Caller ID
        caller_id: String,
        /// Requested model
        model: String,
        /// Requested hold
        amount: u64,
    },
    /// `debit` was called
    Debit {
        /// Reservation ID
        reservation_id: Uuid,
        /// Charged tokens
        total_tokens: u64,
        /// Charged credits
        amount: u64,
    },
    /// `release` was called
    Release {
        /// Reservation ID
        reservation_id: Uuid,
    },
}

#[derive(Debug, Default)]
struct Account {
    balance: u64,
    held: u64,
}

#[derive(Debug)]
struct Hold {
    caller_id: String,
    amount: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    holds: HashMap<Uuid, Hold>,
    calls: Option<Vec<LedgerCall>>,
}

impl LedgerState {
    fn record(&mut self, call: LedgerCall) {
        if let Some(calls) = &mut self.calls {
            calls.push(call);
        }
    }

    /// Remove the hold of `reservation_id`, returning its amount to the account
    fn settle(&mut self, reservation_id: Uuid) -> Option<&mut Account> {
        let hold = self.holds.remove(&reservation_id)?;
        let account = self.accounts.entry(hold.caller_id).or_default();
        account.held = account.held.saturating_sub(hold.amount);
        Some(account)
    }
}

/// Ledger holding balances and reservations in process memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every call for later inspection with [`Self::calls`]
    #[must_use]
    pub fn with_recording(self) -> Self {
        self.state.lock().calls.get_or_insert_with(Vec::new);
        self
    }

    /// Seed an account balance
    #[must_use]
    pub fn with_account(self, caller_id: impl Into<String>, balance: u64) -> Self {
        self.deposit(caller_id, balance);
        self
    }

    /// Add credits to an account, creating it if needed
    pub fn deposit(&self, caller_id: impl Into<String>, amount: u64) {
        let mut state = self.state.lock();
        let account = state.accounts.entry(caller_id.into()).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    /// Total balance, including held credits
    #[must_use]
    pub fn balance(&self, caller_id: &str) -> u64 {
        self.state
            .lock()
            .accounts
            .get(caller_id)
            .map_or(0, |a| a.balance)
    }

    /// Balance minus outstanding holds
    #[must_use]
    pub fn available(&self, caller_id: &str) -> u64 {
        self.state
            .lock()
            .accounts
            .get(caller_id)
            .map_or(0, |a| a.balance.saturating_sub(a.held))
    }

    /// Whether `reservation_id` still holds credit
    #[must_use]
    pub fn is_outstanding(&self, reservation_id: Uuid) -> bool {
        self.state.lock().holds.contains_key(&reservation_id)
    }

    /// Number of reservations not yet resolved
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().holds.len()
    }

    /// Recorded calls in the order observed; empty unless recording
    #[must_use]
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().calls.clone().unwrap_or_default()
    }

    /// Number of recorded `reserve` calls
    #[must_use]
    pub fn reserve_count(&self) -> usize {
        self.count(|c| matches!(c, LedgerCall::Reserve { .. }))
    }

    /// Number of recorded `debit` calls
    #[must_use]
    pub fn debit_count(&self) -> usize {
        self.count(|c| matches!(c, LedgerCall::Debit { .. }))
    }

    /// Number of recorded `release` calls
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.count(|c| matches!(c, LedgerCall::Release { .. }))
    }

    fn count(&self, predicate: impl Fn(&LedgerCall) -> bool) -> usize {
        self.state
            .lock()
            .calls
            .as_ref()
            .map_or(0, |calls| calls.iter().filter(|c| predicate(c)).count())
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn reserve(
        &self,
        caller: &CallerIdentity,
        model: &str,
        estimated: u64,
    ) -> GatewayResult<Reservation> {
        let mut state = self.state.lock();
        state.record(LedgerCall::Reserve {
            caller_id: caller.id.clone(),
            model: model.to_string(),
            amount: estimated,
        });

        let account = state.accounts.entry(caller.id.clone()).or_default();
        let available = account.balance.saturating_sub(account.held);
        if available < estimated {
            debug!(caller_id = %caller.id, required = estimated, available, "Insufficient credits");
            return Err(GatewayError::insufficient_credits(estimated, available));
        }
        account.held += estimated;

        let reservation = Reservation::new(caller, model, estimated);
        state.holds.insert(
            reservation.id,
            Hold {
                caller_id: caller.id.clone(),
                amount: estimated,
            },
        );
        Ok(reservation)
    }

    async fn debit(&self, reservation: &Reservation, charge: Charge) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.record(LedgerCall::Debit {
            reservation_id: reservation.id,
            total_tokens: charge.total_tokens,
            amount: charge.amount,
        });

        match state.settle(reservation.id) {
            Some(account) => account.balance = account.balance.saturating_sub(charge.amount),
            None => debug!(reservation_id = %reservation.id, "Debit on resolved reservation ignored"),
        }
        Ok(())
    }

    async fn release(&self, reservation: &Reservation) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.record(LedgerCall::Release {
            reservation_id: reservation.id,
        });

        if state.settle(reservation.id).is_none() {
            debug!(reservation_id = %reservation.id, "Release on resolved reservation ignored");
        }
        Ok(())
    }
}
