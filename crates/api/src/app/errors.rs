use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use stockledger_infra::StockError;
use stockledger_infra::stock_store::StoreError;

pub fn stock_error_to_response(err: StockError) -> Response {
    let (status, code) = classify(err.root());

    match &err {
        StockError::Reconstruction {
            target_date,
            method,
            ..
        } => {
            tracing::error!(error = %err, %target_date, %method, "balance reconstruction failed");
            json_error_with(
                status,
                code,
                err.to_string(),
                json!({ "target_date": target_date, "method": method }),
            )
        }
        _ => {
            if status.is_server_error() {
                tracing::error!(error = %err, "request failed");
            }
            json_error(status, code, err.to_string())
        }
    }
}

fn classify(err: &StockError) -> (StatusCode, &'static str) {
    match err {
        StockError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        StockError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StockError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        StockError::Unavailable(_) | StockError::Store(StoreError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
        StockError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        StockError::InvariantViolation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation")
        }
        StockError::Reconstruction { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "reconstruction_error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with(status, code, message, Value::Null)
}

/// Like [`json_error`], with extra fields merged into the body.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    extra: Value,
) -> Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    (status, axum::Json(body)).into_response()
}

pub fn invalid_id(what: &str) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "invalid_id",
        format!("{what} must be a UUID"),
    )
}
