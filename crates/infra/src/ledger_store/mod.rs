//! Ledger store implementations.
//!
//! Three backends share the `LedgerStore` contract: an in-memory store for
//! tests/dev, PostgreSQL for production and SQLite for single-host deployments.
//!
//! ## Error Mapping
//!
//! Every SQLx error becomes `LedgerError::PersistenceUnavailable`, tagged with
//! the operation that failed. Rows that no longer satisfy domain rules (blank
//! ids, unknown entry kinds, non-positive amounts) are reported the same way.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use printquota_core::{AccountId, Amount, DisplayName, LedgerError, LedgerResult};
use printquota_ledger::{Account, EntryKind, LedgerEntry, LedgerStore};

use crate::config::{DatabaseConfig, StorageBackend};

pub mod in_memory;
pub mod postgres;
pub mod sqlite;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use sqlite::SqliteLedgerStore;

/// Open the store selected by `config`, creating tables when needed.
pub async fn open_store(config: &DatabaseConfig) -> LedgerResult<Arc<dyn LedgerStore>> {
    match config.backend() {
        StorageBackend::InMemory => {
            tracing::info!("using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        StorageBackend::Postgres => {
            tracing::info!("using postgres ledger store");
            let store = PostgresLedgerStore::connect(&config.url, config.max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Sqlite => {
            tracing::info!(url = %config.url, "using sqlite ledger store");
            let store = SqliteLedgerStore::connect(&config.url).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            LedgerError::persistence(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::persistence(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::persistence(format!("timed out waiting for a connection in {operation}"))
        }
        _ => LedgerError::persistence(format!("sqlx error in {operation}: {err}")),
    }
}

// SQL row types shared by both relational stores.

#[derive(Debug)]
pub(crate) struct AccountRow {
    pub id: String,
    pub display_name: String,
    pub balance: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| LedgerError::persistence(format!("corrupt account row '{}': {what}", row.id));

        if row.balance < 0 {
            return Err(corrupt("negative balance"));
        }

        Ok(Account {
            id: AccountId::new(row.id.clone()).map_err(|_| corrupt("blank id"))?,
            display_name: DisplayName::new(row.display_name.clone()).map_err(|_| corrupt("blank display name"))?,
            balance: row.balance,
            last_activity: row.last_activity,
        })
    }
}

#[derive(Debug)]
pub(crate) struct EntryRow {
    pub sequence: i64,
    pub account_id: String,
    pub kind: String,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| {
            LedgerError::persistence(format!("corrupt ledger entry {}: {what}", row.sequence))
        };

        Ok(LedgerEntry {
            account_id: AccountId::new(row.account_id.clone()).map_err(|_| corrupt("blank account id"))?,
            sequence: u64::try_from(row.sequence).map_err(|_| corrupt("negative sequence"))?,
            kind: EntryKind::parse(&row.kind).ok_or_else(|| corrupt("unknown kind"))?,
            amount: Amount::new(row.amount).map_err(|_| corrupt("non-positive amount"))?,
            occurred_at: row.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_rows_are_validated() {
        let row = AccountRow {
            id: "1-9".to_string(),
            display_name: "ANA".to_string(),
            balance: 5,
            last_activity: None,
        };
        let account = Account::try_from(row).unwrap();
        assert_eq!(account.balance, 5);

        let row = AccountRow {
            id: "1-9".to_string(),
            display_name: "ANA".to_string(),
            balance: -1,
            last_activity: None,
        };
        assert!(matches!(Account::try_from(row), Err(LedgerError::PersistenceUnavailable(_))));
    }

    #[test]
    fn entry_rows_are_validated() {
        let row = |kind: &str, amount| EntryRow {
            sequence: 7,
            account_id: "1-9".to_string(),
            kind: kind.to_string(),
            amount,
            occurred_at: Utc::now(),
        };

        let entry = LedgerEntry::try_from(row("debit", 3)).unwrap();
        assert_eq!(entry.kind, EntryKind::Debit);
        assert_eq!(entry.sequence, 7);

        assert!(LedgerEntry::try_from(row("print", 3)).is_err());
        assert!(LedgerEntry::try_from(row("credit", 0)).is_err());
    }
}
