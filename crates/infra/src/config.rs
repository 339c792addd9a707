//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables fall back to
//! defaults suitable for a single-host deployment backed by a local SQLite
//! file.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use printquota_ledger::LedgerPolicy;
use printquota_observability::LogFormat;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://printquota.db?mode=rwc";
pub const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key} ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which `LedgerStore` implementation a database URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Pool size for Postgres; SQLite always uses one connection.
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "memory".to_string(),
            max_connections: 1,
        }
    }

    pub fn backend(&self) -> StorageBackend {
        let url = self.url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            StorageBackend::Postgres
        } else if url.starts_with("sqlite:") {
            StorageBackend::Sqlite
        } else {
            StorageBackend::InMemory
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database: DatabaseConfig,
    pub policy: LedgerPolicy,
    pub allowed_origins: AllowedOrigins,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: 5,
            },
            policy: LedgerPolicy::default(),
            allowed_origins: AllowedOrigins::Any,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (blank values count as unset).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let host = match get("HOST") {
            Some(v) => v
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| ConfigError::invalid("HOST", &v, e.to_string()))?,
            None => defaults.bind_addr.ip(),
        };
        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("PORT", &v, e.to_string()))?,
            None => defaults.bind_addr.port(),
        };

        let database = DatabaseConfig {
            url: get("DATABASE_URL").unwrap_or(defaults.database.url),
            max_connections: match get("DATABASE_MAX_CONNECTIONS") {
                Some(v) => match v.trim().parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(ConfigError::invalid(
                            "DATABASE_MAX_CONNECTIONS",
                            &v,
                            "must be a positive integer",
                        ));
                    }
                },
                None => defaults.database.max_connections,
            },
        };

        let opening_balance = match get("OPENING_BALANCE") {
            Some(v) => match v.trim().parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => {
                    return Err(ConfigError::invalid(
                        "OPENING_BALANCE",
                        &v,
                        "must be an integer >= 0",
                    ));
                }
            },
            None => defaults.policy.opening_balance,
        };
        let auto_create_accounts = match get("AUTO_CREATE_ACCOUNTS") {
            Some(v) => parse_bool("AUTO_CREATE_ACCOUNTS", &v)?,
            None => defaults.policy.auto_create_accounts,
        };

        let allowed_origins = match get("CORS_ALLOWED_ORIGINS") {
            Some(v) if !v.split(',').any(|o| o.trim() == "*") => AllowedOrigins::List(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => AllowedOrigins::Any,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(v) => v
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("LOG_FORMAT", &v, e))?,
            None => defaults.log_format,
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            database,
            policy: LedgerPolicy {
                opening_balance,
                auto_create_accounts,
            },
            allowed_origins,
            log_format,
        })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}
