use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

/// Account routes, mounted at the root.
///
/// `credit`, `debit` and `query` are static segments, so `GET` on them would
/// otherwise miss `/accounts/:id`; they answer `GET` as a lookup of the account
/// with that literal id. The collection also answers with a trailing slash.
pub fn router() -> Router {
    Router::new()
        .route("/accounts", get(list_accounts).post(provision_account))
        .route("/accounts/", get(list_accounts).post(provision_account))
        .route(
            "/accounts/credit",
            post(credit_account).get(|services: Extension<Arc<AppServices>>| get_literal(services, "credit")),
        )
        .route(
            "/accounts/debit",
            post(debit_account).get(|services: Extension<Arc<AppServices>>| get_literal(services, "debit")),
        )
        .route(
            "/accounts/query",
            post(query_account).get(|services: Extension<Arc<AppServices>>| get_literal(services, "query")),
        )
        .route("/accounts/:id", get(get_account))
}

pub async fn credit_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreditRequest>, JsonRejection>,
) -> axum::response::Response {
    let input = match dto::body_or_default(body).validate() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .credit(&input.id, &input.display_name, input.amount)
        .await
    {
        Ok(receipt) => {
            let name = receipt.account.display_name.as_str();
            let message = if receipt.created {
                format!("balance loaded for {name}")
            } else {
                format!("balance updated for {name}")
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "message": message,
                    "new_balance": receipt.new_balance(),
                    "created": receipt.created,
                })),
            )
                .into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn debit_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::DebitRequest>, JsonRejection>,
) -> axum::response::Response {
    let input = match dto::body_or_default(body).validate() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.debit(&input.id, input.amount).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "debit recorded",
                "new_balance": receipt.new_balance(),
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn query_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::QueryRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match dto::body_or_default(body).validate() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    account_statement(&services, &id).await
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    account_statement(&services, &id).await
}

async fn get_literal(
    Extension(services): Extension<Arc<AppServices>>,
    id: &'static str,
) -> axum::response::Response {
    account_statement(&services, id).await
}

async fn account_statement(services: &AppServices, id: &str) -> axum::response::Response {
    match services.ledger.get_account(id).await {
        Ok(snapshot) => (StatusCode::OK, Json(dto::snapshot_to_json(&snapshot))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger.list_accounts().await {
        Ok(accounts) => {
            let accounts = accounts
                .iter()
                .map(dto::account_summary_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "accounts": accounts }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn provision_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ProvisionRequest>, JsonRejection>,
) -> axum::response::Response {
    let input = match dto::body_or_default(body).validate() {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.provision(&input.id, &input.display_name).await {
        Ok(provisioned) => {
            let status = if provisioned.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let message = if provisioned.created {
                "account created"
            } else {
                "account already exists"
            };
            (
                status,
                Json(serde_json::json!({
                    "message": message,
                    "id": provisioned.account.id.as_str(),
                    "display_name": provisioned.account.display_name.as_str(),
                    "balance": provisioned.account.balance,
                    "created": provisioned.created,
                })),
            )
                .into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
