//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every failure surfaced by a ledger operation is one of these kinds. None of
/// them are retried internally; the caller decides what to do.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed, missing or non-positive input. The caller must resend.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No account exists for the given identifier.
    #[error("account not found: {0}")]
    NotFound(String),

    /// A debit asked for more pages than the account holds.
    #[error("insufficient balance: requested {requested}, available {balance}")]
    InsufficientBalance { balance: i64, requested: i64 },

    /// The storage collaborator is unreachable or failed mid-operation.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl LedgerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceUnavailable(msg.into())
    }

    /// Stable machine-readable kind, used in logs and wire payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::PersistenceUnavailable(_) => "storage_unavailable",
        }
    }
}
