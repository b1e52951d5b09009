//! # Gateway Billing
//!
//! Credit reservation for the IAFactory LLM gateway.
//!
//! - [`CreditLedger`]: the reserve / debit / release contract
//! - [`ReservationGuard`]: guarantees exactly one terminal resolution per reservation
//! - [`PriceBook`]: reservation estimates and actual charges
//! - [`InMemoryLedger`]: process-local ledger, also used as the test double

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod guard;
pub mod ledger;
pub mod memory;
pub mod price;

pub use guard::{ReservationGuard, Resolution};
pub use ledger::{Charge, CreditLedger, Reservation};
pub use memory::{InMemoryLedger, LedgerCall};
pub use price::PriceBook;
