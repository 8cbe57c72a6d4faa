//! HTTP application wiring.
//!
//! - `services.rs`: store and service wiring
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use stockledger_infra::StockConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router over freshly wired in-memory services.
pub fn build_app(config: StockConfig) -> Router {
    build_app_with(Arc::new(AppServices::in_memory(config)))
}

/// Build the router over existing services (lets callers seed snapshots and
/// catalog entries, or pin the clock).
pub fn build_app_with(services: Arc<AppServices>) -> Router {
    let scoped = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn(middleware::request_context)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
}
