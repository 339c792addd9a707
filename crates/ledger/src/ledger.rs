use chrono::{DateTime, SubsecRound, Utc};
use tracing::instrument;

use printquota_core::{AccountId, Amount, DisplayName, LedgerError, LedgerResult};

use crate::account::{Account, EntryKind, LedgerEntry, PendingEntry};
use crate::store::{AccountSnapshot, Decision, LedgerStore, Posting};

/// Deployment policy for account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// Balance of an account seeded by `provision`. Accounts created by their
    /// first credit start from that credit alone.
    pub opening_balance: i64,
    /// Whether a credit to an unknown id creates the account.
    pub auto_create_accounts: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            opening_balance: 0,
            auto_create_accounts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditReceipt {
    pub account: Account,
    pub entry: LedgerEntry,
    pub created: bool,
}

impl CreditReceipt {
    pub fn new_balance(&self) -> i64 {
        self.account.balance
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitReceipt {
    pub account: Account,
    pub entry: LedgerEntry,
}

impl DebitReceipt {
    pub fn new_balance(&self) -> i64 {
        self.account.balance
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub account: Account,
    pub created: bool,
}

/// The balance ledger: validates requests and applies credits and debits
/// through a [`LedgerStore`].
///
/// Holds no mutable state of its own; every operation is a single store call.
#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
    policy: LedgerPolicy,
}

impl<S> Ledger<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Add `amount` pages to `id`, creating the account if policy allows.
    #[instrument(skip(self, display_name), fields(account_id = %id))]
    pub async fn credit(&self, id: &str, display_name: &str, amount: i64) -> LedgerResult<CreditReceipt> {
        let id = AccountId::new(id)?;
        let display_name = DisplayName::new(display_name)?;
        let amount = Amount::new(amount)?;

        let policy = self.policy;
        let now = current_time();
        let key = id.clone();
        let decide: Decision = Box::new(move |current| {
            let account = match current {
                Some(account) => account,
                None if policy.auto_create_accounts => Account::open(key, display_name.clone(), 0),
                None => return Err(LedgerError::not_found(key.as_str())),
            };

            let at = account.entry_time(now);
            let next = account.credited(display_name, amount, at)?;
            Ok(Posting {
                account: next,
                entry: Some(PendingEntry {
                    kind: EntryKind::Credit,
                    amount,
                    occurred_at: at,
                }),
            })
        });

        let committed = self.store.transact(&id, decide).await.inspect_err(log_rejection)?;
        let entry = committed
            .entry
            .ok_or_else(|| LedgerError::persistence("store did not record the credit entry"))?;

        tracing::info!(
            account_id = %id,
            amount = amount.get(),
            new_balance = committed.account.balance,
            created = committed.created,
            "credit applied"
        );

        Ok(CreditReceipt {
            account: committed.account,
            entry,
            created: committed.created,
        })
    }

    /// Take `amount` pages from `id`. Never partial: either the full amount is
    /// available or nothing changes.
    #[instrument(skip(self), fields(account_id = %id))]
    pub async fn debit(&self, id: &str, amount: i64) -> LedgerResult<DebitReceipt> {
        let id = AccountId::new(id)?;
        let amount = Amount::new(amount)?;

        let now = current_time();
        let key = id.clone();
        let decide: Decision = Box::new(move |current| {
            let account = current.ok_or_else(|| LedgerError::not_found(key.as_str()))?;
            let at = account.entry_time(now);
            let next = account.debited(amount, at)?;
            Ok(Posting {
                account: next,
                entry: Some(PendingEntry {
                    kind: EntryKind::Debit,
                    amount,
                    occurred_at: at,
                }),
            })
        });

        let committed = self.store.transact(&id, decide).await.inspect_err(log_rejection)?;
        let entry = committed
            .entry
            .ok_or_else(|| LedgerError::persistence("store did not record the debit entry"))?;

        tracing::info!(
            account_id = %id,
            amount = amount.get(),
            new_balance = committed.account.balance,
            "debit applied"
        );

        Ok(DebitReceipt {
            account: committed.account,
            entry,
        })
    }

    /// Current balance plus full history, most recent first.
    #[instrument(skip(self), fields(account_id = %id))]
    pub async fn get_account(&self, id: &str) -> LedgerResult<AccountSnapshot> {
        let id = AccountId::new(id)?;
        self.store
            .snapshot(&id)
            .await?
            .ok_or_else(|| LedgerError::not_found(id.as_str()))
    }

    /// Every account, sorted by id.
    #[instrument(skip(self))]
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let mut accounts = self.store.accounts().await?;
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    /// Seed an account at the opening balance without writing history.
    /// An existing account is returned as-is.
    #[instrument(skip(self, display_name), fields(account_id = %id))]
    pub async fn provision(&self, id: &str, display_name: &str) -> LedgerResult<Provisioned> {
        let id = AccountId::new(id)?;
        let display_name = DisplayName::new(display_name)?;

        let opening_balance = self.policy.opening_balance;
        let key = id.clone();
        let decide: Decision = Box::new(move |current| {
            let account = current.unwrap_or_else(|| Account::open(key, display_name, opening_balance));
            Ok(Posting { account, entry: None })
        });

        let committed = self.store.transact(&id, decide).await.inspect_err(log_rejection)?;
        if committed.created {
            tracing::info!(account_id = %id, balance = committed.account.balance, "account provisioned");
        }

        Ok(Provisioned {
            account: committed.account,
            created: committed.created,
        })
    }
}

/// Wall-clock time at the precision the SQL stores keep (microseconds).
fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn log_rejection(err: &LedgerError) {
    match err {
        LedgerError::PersistenceUnavailable(msg) => tracing::warn!(error = %msg, "ledger store failed"),
        other => tracing::debug!(kind = other.kind(), error = %other, "ledger operation rejected"),
    }
}
