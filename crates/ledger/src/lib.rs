//! Prepaid page balance ledger.
//!
//! Domain logic only: the persistence collaborator is the [`LedgerStore`] trait,
//! implemented in `printquota-infra`.

pub mod account;
pub mod ledger;
pub mod store;

pub use account::{Account, EntryKind, LedgerEntry, PendingEntry, sort_history};
pub use ledger::{CreditReceipt, DebitReceipt, Ledger, LedgerPolicy, Provisioned};
pub use store::{AccountSnapshot, Committed, Decision, LedgerStore, Posting};
