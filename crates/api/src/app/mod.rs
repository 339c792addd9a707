//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger + store wiring from configuration
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use printquota_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Opens the configured store (running migrations for SQL backends) before
/// any route is served.
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config)
        .await
        .context("failed to open ledger store")?;
    Ok(router(Arc::new(services), config))
}

/// Router over already-built services.
pub fn router(services: Arc<services::AppServices>, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::trace_layer())
                .layer(middleware::cors_layer(&config.allowed_origins)),
        )
}
