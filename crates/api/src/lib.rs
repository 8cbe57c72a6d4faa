//! HTTP API: routing, request context and JSON mapping over the stock services.

pub mod app;
pub mod context;
pub mod middleware;
