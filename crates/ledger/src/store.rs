//! Persistence boundary consumed by the ledger.

use std::sync::Arc;

use printquota_core::{AccountId, LedgerResult};

use crate::account::{Account, LedgerEntry, PendingEntry};

/// Outcome of a ledger decision: the account state to persist and, for
/// balance changes, the entry to append with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub account: Account,
    pub entry: Option<PendingEntry>,
}

/// Synchronous decision run inside a store transaction.
///
/// Receives the current account (`None` if absent). Returning an error aborts
/// the transaction without writing anything.
pub type Decision = Box<dyn FnOnce(Option<Account>) -> LedgerResult<Posting> + Send>;

/// What a successful `transact` wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub account: Account,
    pub entry: Option<LedgerEntry>,
    /// True when the account row did not exist before this transaction.
    pub created: bool,
}

/// Account plus history, read from one consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub account: Account,
    /// Most recent first.
    pub history: Vec<LedgerEntry>,
}

/// Durable keyed storage for accounts and their history.
///
/// ## Implementation Requirements
///
/// - `transact` is one atomic read-modify-write: two concurrent calls for the
///   same account must not both decide against the same prior state, and the
///   account update and entry append are persisted together or not at all.
/// - Entry sequence numbers are assigned by the store and strictly increase.
/// - `snapshot` never returns an entry whose balance change is missing from the
///   returned account, or the reverse.
/// - Storage failures surface as `LedgerError::PersistenceUnavailable`.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn transact(&self, id: &AccountId, decide: Decision) -> LedgerResult<Committed>;

    async fn snapshot(&self, id: &AccountId) -> LedgerResult<Option<AccountSnapshot>>;

    async fn accounts(&self) -> LedgerResult<Vec<Account>>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn transact(&self, id: &AccountId, decide: Decision) -> LedgerResult<Committed> {
        (**self).transact(id, decide).await
    }

    async fn snapshot(&self, id: &AccountId) -> LedgerResult<Option<AccountSnapshot>> {
        (**self).snapshot(id).await
    }

    async fn accounts(&self) -> LedgerResult<Vec<Account>> {
        (**self).accounts().await
    }
}
