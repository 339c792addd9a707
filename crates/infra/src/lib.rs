//! Infrastructure layer: ledger stores (Postgres, SQLite, in-memory) and
//! configuration loading.

pub mod config;
pub mod ledger_store;


pub use config::{AllowedOrigins, AppConfig, ConfigError, DatabaseConfig, StorageBackend};
pub use ledger_store::{open_store, InMemoryLedgerStore, PostgresLedgerStore, SqliteLedgerStore};
