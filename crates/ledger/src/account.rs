use chrono::{DateTime, Utc};

use printquota_core::{AccountId, Amount, DisplayName, LedgerError, LedgerResult};

/// Direction of a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Pages added to the account.
    Credit,
    /// Pages consumed by a print job.
    Debit,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryKind::Credit),
            "debit" => Some(EntryKind::Debit),
            _ => None,
        }
    }
}

/// Current state of one prepaid page account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub display_name: DisplayName,
    /// Never negative.
    pub balance: i64,
    /// Timestamp of the newest ledger entry, if any.
    pub last_activity: Option<DateTime<Utc>>,
}

impl Account {
    /// A fresh account holding `opening_balance` pages and no history.
    pub fn open(id: AccountId, display_name: DisplayName, opening_balance: i64) -> Self {
        Self {
            id,
            display_name,
            balance: opening_balance,
            last_activity: None,
        }
    }

    /// Entry timestamp for an operation observed at `now`.
    ///
    /// Clamped to `last_activity` so an account's entries never go back in time.
    pub fn entry_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_activity {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    /// State after crediting `amount` pages at `at`.
    pub fn credited(&self, display_name: DisplayName, amount: Amount, at: DateTime<Utc>) -> LedgerResult<Self> {
        let balance = self
            .balance
            .checked_add(amount.get())
            .ok_or_else(|| LedgerError::invalid_input("amount overflows the account balance"))?;

        Ok(Self {
            id: self.id.clone(),
            display_name,
            balance,
            last_activity: Some(at),
        })
    }

    /// State after debiting `amount` pages at `at`.
    ///
    /// The balance is a hard ceiling: nothing is taken when it is not enough.
    pub fn debited(&self, amount: Amount, at: DateTime<Utc>) -> LedgerResult<Self> {
        if amount.get() > self.balance {
            return Err(LedgerError::InsufficientBalance {
                balance: self.balance,
                requested: amount.get(),
            });
        }

        Ok(Self {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            balance: self.balance - amount.get(),
            last_activity: Some(at),
        })
    }
}

/// An entry decided by the ledger but not yet stored (no sequence number yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub kind: EntryKind,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Immutable history record of one credit or debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub account_id: AccountId,
    /// Store-assigned insertion number; breaks ties between equal timestamps.
    pub sequence: u64,
    pub kind: EntryKind,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_pending(account_id: AccountId, sequence: u64, pending: PendingEntry) -> Self {
        Self {
            account_id,
            sequence,
            kind: pending.kind,
            amount: pending.amount,
            occurred_at: pending.occurred_at,
        }
    }
}

/// Sort history most recent first: timestamp descending, then sequence descending.
pub fn sort_history(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.sequence.cmp(&a.sequence))
    });
}
