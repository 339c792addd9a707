use std::collections::HashMap;
use std::sync::RwLock;

use printquota_core::{AccountId, LedgerError, LedgerResult};
use printquota_ledger::{
    sort_history, Account, AccountSnapshot, Committed, Decision, LedgerEntry, LedgerStore,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<AccountId, Vec<LedgerEntry>>,
    last_sequence: u64,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. One lock guards accounts, history and the sequence
/// counter, so every `transact` is atomic and every `snapshot` is consistent.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn transact(&self, id: &AccountId, decide: Decision) -> LedgerResult<Committed> {
        let mut state = self
            .state
            .write()
            .map_err(|_| LedgerError::persistence("lock poisoned"))?;

        let current = state.accounts.get(id).cloned();
        let created = current.is_none();
        let posting = decide(current)?;

        if posting.account.id != *id {
            return Err(LedgerError::persistence(format!(
                "decision for '{id}' produced account '{}'",
                posting.account.id
            )));
        }

        let entry = match posting.entry {
            Some(pending) => {
                state.last_sequence += 1;
                let entry = LedgerEntry::from_pending(id.clone(), state.last_sequence, pending);
                state.entries.entry(id.clone()).or_default().push(entry.clone());
                Some(entry)
            }
            None => None,
        };
        state.accounts.insert(id.clone(), posting.account.clone());

        Ok(Committed {
            account: posting.account,
            entry,
            created,
        })
    }

    async fn snapshot(&self, id: &AccountId) -> LedgerResult<Option<AccountSnapshot>> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerError::persistence("lock poisoned"))?;

        let Some(account) = state.accounts.get(id).cloned() else {
            return Ok(None);
        };
        let mut history = state.entries.get(id).cloned().unwrap_or_default();
        sort_history(&mut history);

        Ok(Some(AccountSnapshot { account, history }))
    }

    async fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerError::persistence("lock poisoned"))?;

        Ok(state.accounts.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printquota_ledger::{EntryKind, Ledger, LedgerPolicy};
    use proptest::prelude::*;

    #[tokio::test]
    async fn decision_error_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let id = AccountId::new("1-9").unwrap();
        let decide: Decision = Box::new(|_| Err(LedgerError::invalid_input("nope")));
        let err = store.transact(&id, decide).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert!(store.snapshot(&id).await.unwrap().is_none());
        assert!(store.accounts().await.unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Credit(i64),
        Debit(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..500).prop_map(Op::Credit),
            (1i64..500).prop_map(Op::Debit),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the stored balance always equals the sum of recorded
        /// credits minus recorded debits, and rejected debits record nothing.
        #[test]
        fn balance_matches_history(ops in prop::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let ledger = Ledger::new(InMemoryLedgerStore::new(), LedgerPolicy::default());
                let mut accepted = 0usize;

                for op in &ops {
                    let ok = match *op {
                        Op::Credit(n) => ledger.credit("1-9", "ANA", n).await.is_ok(),
                        Op::Debit(n) => match ledger.debit("1-9", n).await {
                            Ok(_) => true,
                            Err(LedgerError::InsufficientBalance { .. } | LedgerError::NotFound(_)) => false,
                            Err(other) => panic!("unexpected error: {other:?}"),
                        },
                    };
                    if ok {
                        accepted += 1;
                    }
                }

                let Ok(statement) = ledger.get_account("1-9").await else {
                    // Only debits were generated, so the account never existed.
                    assert_eq!(accepted, 0);
                    return;
                };
                let net: i64 = statement
                    .history
                    .iter()
                    .map(|e| match e.kind {
                        EntryKind::Credit => e.amount.get(),
                        EntryKind::Debit => -e.amount.get(),
                    })
                    .sum();
                assert_eq!(statement.account.balance, net);
                assert!(statement.account.balance >= 0);
                assert_eq!(statement.history.len(), accepted);
            });
        }
    }
}
