use axum::Router;

pub mod audits;
pub mod stock;
pub mod system;

/// Router for all company-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/stock", stock::router())
        .nest("/audits", audits::router())
}
