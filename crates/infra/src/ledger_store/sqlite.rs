//! SQLite-backed ledger store.
//!
//! The pool holds exactly one connection, so transactions never interleave:
//! each `transact` is a serialized read-modify-write. This also makes
//! `sqlite::memory:` usable, since the single connection owns the database.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch so that
//! `ORDER BY` compares them numerically.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use printquota_core::{AccountId, LedgerError, LedgerResult};
use printquota_ledger::{
    Account, AccountSnapshot, Committed, Decision, LedgerEntry, LedgerStore, PendingEntry,
};

use super::{map_sqlx_error, AccountRow, EntryRow};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id               TEXT PRIMARY KEY NOT NULL,
        display_name     TEXT NOT NULL,
        balance          INTEGER NOT NULL CHECK (balance >= 0),
        last_activity_us INTEGER NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        sequence       INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id     TEXT NOT NULL REFERENCES accounts (id),
        kind           TEXT NOT NULL CHECK (kind IN ('credit', 'debit')),
        amount         INTEGER NOT NULL CHECK (amount > 0),
        occurred_at_us INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ledger_entries_history_idx
        ON ledger_entries (account_id, occurred_at_us DESC, sequence DESC)
    "#,
];

/// SQLite-backed ledger store.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: Arc<SqlitePool>,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect to `url` (e.g. `sqlite://printquota.db` or `sqlite::memory:`),
    /// creating the database file if it is missing.
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("parse_url", e))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// In-memory SQLite database, mostly for tests.
    pub async fn in_memory() -> LedgerResult<Self> {
        let store = Self::connect("sqlite::memory:").await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> LedgerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn load_account(
        tx: &mut Transaction<'_, Sqlite>,
        id: &AccountId,
    ) -> LedgerResult<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, display_name, balance, last_activity_us FROM accounts WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_account", e))?;

        row.map(|r| {
            AccountRow::from_row(&r)
                .map_err(|e| map_sqlx_error("decode_account", e))
                .and_then(Account::try_from)
        })
        .transpose()
    }

    async fn insert_entry(
        tx: &mut Transaction<'_, Sqlite>,
        id: &AccountId,
        pending: PendingEntry,
    ) -> LedgerResult<LedgerEntry> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (account_id, kind, amount, occurred_at_us)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(id.as_str())
        .bind(pending.kind.as_str())
        .bind(pending.amount.get())
        .bind(pending.occurred_at.timestamp_micros())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let sequence = result.last_insert_rowid() as u64;
        Ok(LedgerEntry::from_pending(id.clone(), sequence, pending))
    }
}

#[async_trait::async_trait]
impl LedgerStore for SqliteLedgerStore {
    #[instrument(skip(self, decide), fields(account_id = %id))]
    async fn transact(&self, id: &AccountId, decide: Decision) -> LedgerResult<Committed> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = Self::load_account(&mut tx, id).await?;
        let created = current.is_none();

        let posting = match decide(current) {
            Ok(posting) => posting,
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        };

        sqlx::query(
            r#"
            INSERT INTO accounts (id, display_name, balance, last_activity_us)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id)
            DO UPDATE SET
                display_name = excluded.display_name,
                balance = excluded.balance,
                last_activity_us = excluded.last_activity_us
            "#,
        )
        .bind(id.as_str())
        .bind(posting.account.display_name.as_str())
        .bind(posting.account.balance)
        .bind(posting.account.last_activity.map(|t| t.timestamp_micros()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_account", e))?;

        let entry = match posting.entry {
            Some(pending) => Some(Self::insert_entry(&mut tx, id, pending).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Committed {
            account: posting.account,
            entry,
            created,
        })
    }

    #[instrument(skip(self), fields(account_id = %id))]
    async fn snapshot(&self, id: &AccountId) -> LedgerResult<Option<AccountSnapshot>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(account) = Self::load_account(&mut tx, id).await? else {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT sequence, account_id, kind, amount, occurred_at_us
            FROM ledger_entries
            WHERE account_id = ?1
            ORDER BY occurred_at_us DESC, sequence DESC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_history", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let history = rows
            .iter()
            .map(|r| {
                EntryRow::from_row(r)
                    .map_err(|e| map_sqlx_error("decode_entry", e))
                    .and_then(LedgerEntry::try_from)
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(Some(AccountSnapshot { account, history }))
    }

    #[instrument(skip(self))]
    async fn accounts(&self) -> LedgerResult<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT id, display_name, balance, last_activity_us FROM accounts ORDER BY id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_accounts", e))?;

        rows.iter()
            .map(|r| {
                AccountRow::from_row(r)
                    .map_err(|e| map_sqlx_error("decode_account", e))
                    .and_then(Account::try_from)
            })
            .collect()
    }
}

fn from_micros(column: &str, micros: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(LedgerError::persistence(format!("timestamp out of range: {micros}"))),
    })
}

impl<'r> FromRow<'r, SqliteRow> for AccountRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let last_activity: Option<i64> = row.try_get("last_activity_us")?;
        Ok(AccountRow {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            balance: row.try_get("balance")?,
            last_activity: last_activity
                .map(|us| from_micros("last_activity_us", us))
                .transpose()?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for EntryRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            sequence: row.try_get("sequence")?,
            account_id: row.try_get("account_id")?,
            kind: row.try_get("kind")?,
            amount: row.try_get("amount")?,
            occurred_at: from_micros("occurred_at_us", row.try_get("occurred_at_us")?)?,
        })
    }
}
