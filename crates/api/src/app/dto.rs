use axum::extract::rejection::JsonRejection;
use axum::Json;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::Value;

use printquota_core::{Amount, LedgerError};
use printquota_ledger::{Account, AccountSnapshot, LedgerEntry};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------
//
// Fields are kept as raw JSON so that "absent" (missing_fields) and "present
// but malformed" (invalid_input) can be told apart.

#[derive(Debug, Default, Deserialize)]
pub struct CreditRequest {
    pub id: Option<Value>,
    pub display_name: Option<Value>,
    pub amount: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebitRequest {
    pub id: Option<Value>,
    pub amount: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    pub id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    pub id: Option<Value>,
    pub display_name: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditInput {
    pub id: String,
    pub display_name: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitInput {
    pub id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionInput {
    pub id: String,
    pub display_name: String,
}

/// A body that failed to parse is handled like an empty one.
pub fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> T {
    match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable request body");
            T::default()
        }
    }
}

impl CreditRequest {
    pub fn validate(self) -> Result<CreditInput, axum::response::Response> {
        let mut missing = Vec::new();
        let id = present(self.id, "id", true, &mut missing);
        let display_name = present(self.display_name, "display_name", true, &mut missing);
        let amount = present(self.amount, "amount", false, &mut missing);

        match (id, display_name, amount) {
            (Some(id), Some(display_name), Some(amount)) => Ok(CreditInput {
                id: text(id, "id")?,
                display_name: text(display_name, "display_name")?,
                amount: pages(&amount)?,
            }),
            _ => Err(errors::missing_fields(&missing)),
        }
    }
}

impl DebitRequest {
    pub fn validate(self) -> Result<DebitInput, axum::response::Response> {
        let mut missing = Vec::new();
        let id = present(self.id, "id", true, &mut missing);
        let amount = present(self.amount, "amount", false, &mut missing);

        match (id, amount) {
            (Some(id), Some(amount)) => Ok(DebitInput {
                id: text(id, "id")?,
                amount: pages(&amount)?,
            }),
            _ => Err(errors::missing_fields(&missing)),
        }
    }
}

impl QueryRequest {
    pub fn validate(self) -> Result<String, axum::response::Response> {
        let mut missing = Vec::new();
        match present(self.id, "id", true, &mut missing) {
            Some(id) => text(id, "id"),
            None => Err(errors::missing_fields(&missing)),
        }
    }
}

impl ProvisionRequest {
    pub fn validate(self) -> Result<ProvisionInput, axum::response::Response> {
        let mut missing = Vec::new();
        let id = present(self.id, "id", true, &mut missing);
        let display_name = present(self.display_name, "display_name", true, &mut missing);

        match (id, display_name) {
            (Some(id), Some(display_name)) => Ok(ProvisionInput {
                id: text(id, "id")?,
                display_name: text(display_name, "display_name")?,
            }),
            _ => Err(errors::missing_fields(&missing)),
        }
    }
}

/// `None` (and the field recorded as missing) for absent, `null`, or, for
/// text fields, the empty string.
fn present(
    value: Option<Value>,
    field: &'static str,
    is_text: bool,
    missing: &mut Vec<&'static str>,
) -> Option<Value> {
    match value {
        None | Some(Value::Null) => {
            missing.push(field);
            None
        }
        Some(Value::String(s)) if is_text && s.is_empty() => {
            missing.push(field);
            None
        }
        Some(v) => Some(v),
    }
}

fn text(value: Value, field: &str) -> Result<String, axum::response::Response> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(errors::ledger_error_to_response(LedgerError::invalid_input(
            format!("{field} must be a string"),
        ))),
    }
}

fn pages(value: &Value) -> Result<i64, axum::response::Response> {
    Amount::from_json(value)
        .map(Amount::get)
        .map_err(errors::ledger_error_to_response)
}

// -------------------------
// Response mapping
// -------------------------

pub fn entry_to_json(e: &LedgerEntry) -> serde_json::Value {
    serde_json::json!({
        "kind": e.kind.as_str(),
        "amount": e.amount.get(),
        "timestamp": e.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

pub fn snapshot_to_json(s: &AccountSnapshot) -> serde_json::Value {
    serde_json::json!({
        "id": s.account.id.as_str(),
        "display_name": s.account.display_name.as_str(),
        "balance": s.account.balance,
        "history": s.history.iter().map(entry_to_json).collect::<Vec<_>>(),
    })
}

pub fn account_summary_to_json(a: &Account) -> serde_json::Value {
    serde_json::json!({
        "id": a.id.as_str(),
        "display_name": a.display_name.as_str(),
        "balance": a.balance,
    })
}
