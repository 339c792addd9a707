//! `printquota-core`: domain primitives for the page balance ledger.
//!
//! This crate contains **pure domain** types (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{LedgerError, LedgerResult};
pub use id::AccountId;
pub use value_object::{Amount, DisplayName, ValueObject};
