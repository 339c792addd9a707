//! Postgres-backed ledger store.
//!
//! ## Atomicity
//!
//! `transact` runs in one transaction that first takes a transaction-scoped
//! advisory lock keyed by the account id, then reads the account `FOR UPDATE`.
//! The advisory lock also covers the case where the account row does not
//! exist yet, so two first credits for the same id serialize instead of
//! racing on the primary key. The lock is released on commit or rollback.
//!
//! `snapshot` reads the account and its history inside one `REPEATABLE READ`
//! transaction, so both queries see the same committed state.

use std::sync::Arc;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use printquota_core::{AccountId, LedgerResult};
use printquota_ledger::{
    Account, AccountSnapshot, Committed, Decision, LedgerEntry, LedgerStore, PendingEntry,
};

use super::{map_sqlx_error, AccountRow, EntryRow};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id            TEXT PRIMARY KEY,
        display_name  TEXT NOT NULL,
        balance       BIGINT NOT NULL CHECK (balance >= 0),
        last_activity TIMESTAMPTZ NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        sequence    BIGSERIAL PRIMARY KEY,
        account_id  TEXT NOT NULL REFERENCES accounts (id),
        kind        TEXT NOT NULL CHECK (kind IN ('credit', 'debit')),
        amount      BIGINT NOT NULL CHECK (amount > 0),
        occurred_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ledger_entries_history_idx
        ON ledger_entries (account_id, occurred_at DESC, sequence DESC)
    "#,
];

/// Postgres-backed ledger store.
///
/// Uses the SQLx connection pool (Send + Sync); every connection goes back to
/// the pool when its transaction ends, on success or error.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(url: &str, max_connections: u32) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
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
        tx: &mut Transaction<'_, Postgres>,
        id: &AccountId,
        for_update: bool,
    ) -> LedgerResult<Option<Account>> {
        let sql = if for_update {
            "SELECT id, display_name, balance, last_activity FROM accounts WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, display_name, balance, last_activity FROM accounts WHERE id = $1"
        };

        let row = sqlx::query(sql)
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
        tx: &mut Transaction<'_, Postgres>,
        id: &AccountId,
        pending: PendingEntry,
    ) -> LedgerResult<LedgerEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (account_id, kind, amount, occurred_at)
            VALUES ($1, $2, $3, $4)
            RETURNING sequence
            "#,
        )
        .bind(id.as_str())
        .bind(pending.kind.as_str())
        .bind(pending.amount.get())
        .bind(pending.occurred_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| map_sqlx_error("decode_sequence", e))?;

        Ok(LedgerEntry::from_pending(id.clone(), sequence as u64, pending))
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, decide), fields(account_id = %id))]
    async fn transact(&self, id: &AccountId, decide: Decision) -> LedgerResult<Committed> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("account_lock", e))?;

        let current = Self::load_account(&mut tx, id, true).await?;
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
            INSERT INTO accounts (id, display_name, balance, last_activity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                balance = EXCLUDED.balance,
                last_activity = EXCLUDED.last_activity
            "#,
        )
        .bind(id.as_str())
        .bind(posting.account.display_name.as_str())
        .bind(posting.account.balance)
        .bind(posting.account.last_activity)
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

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let Some(account) = Self::load_account(&mut tx, id, false).await? else {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT sequence, account_id, kind, amount, occurred_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY occurred_at DESC, sequence DESC
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
            "SELECT id, display_name, balance, last_activity FROM accounts ORDER BY id",
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

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            balance: row.try_get("balance")?,
            last_activity: row.try_get("last_activity")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            sequence: row.try_get("sequence")?,
            account_id: row.try_get("account_id")?,
            kind: row.try_get("kind")?,
            amount: row.try_get("amount")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}
