use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use printquota_core::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match &err {
        LedgerError::InvalidInput(_) | LedgerError::InsufficientBalance { .. } => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::PersistenceUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind(), err.to_string())
}

pub fn missing_fields(fields: &[&str]) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "missing_fields",
        format!("missing required fields: {}", fields.join(", ")),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
