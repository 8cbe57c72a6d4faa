use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use stockledger_core::{AuditId, AuditItemId};
use stockledger_infra::{StockError, StockResult};
use stockledger_inventory::StockAudit;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, CompanyContext};
use crate::middleware::require_actor;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_audit))
        .route("/:id", get(get_audit).delete(delete_audit))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:item_id/count", put(record_count))
        .route("/:id/complete", post(complete_audit))
        .route("/:id/apply", post(apply_differences))
}

/// Load an audit, hiding audits owned by other companies.
fn owned_audit(services: &AppServices, company: CompanyContext, id: AuditId) -> StockResult<StockAudit> {
    let audit = services.audits.get_audit(id)?;
    if audit.company_id != company.company_id() {
        return Err(StockError::not_found(format!("audit {id}")));
    }
    Ok(audit)
}

fn parse_audit_id(raw: &str) -> Result<AuditId, Response> {
    raw.parse().map_err(|_| errors::invalid_id("audit id"))
}

pub async fn open_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Json(body): Json<dto::OpenAuditRequest>,
) -> Response {
    match services.audits.open_audit(company.company_id(), body.warehouse_id) {
        Ok(audit) => (StatusCode::CREATED, Json(audit)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn get_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let loaded = owned_audit(&services, company, id)
        .and_then(|audit| Ok((audit, services.audits.list_items(id)?)));
    match loaded {
        Ok((audit, items)) => Json(dto::audit_json(&audit, &items)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn delete_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = owned_audit(&services, company, id).and_then(|_| services.audits.delete_audit(id));
    match deleted {
        Ok(items_removed) => Json(serde_json::json!({
            "audit_id": id,
            "items_removed": items_removed,
        }))
        .into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddAuditItemRequest>,
) -> Response {
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let added = owned_audit(&services, company, id)
        .and_then(|_| services.audits.add_item(id, body.stock_item_id));
    match added {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn record_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path((id, item_id)): Path<(String, String)>,
    Json(body): Json<dto::RecordCountRequest>,
) -> Response {
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id: AuditItemId = match item_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("audit item id"),
    };

    let counted = owned_audit(&services, company, id)
        .and_then(|_| services.audits.record_count(id, item_id, body.actual_quantity));
    match counted {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn complete_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let completed = owned_audit(&services, company, id).and_then(|_| services.audits.complete_audit(id));
    match completed {
        Ok(audit) => Json(audit).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn apply_differences(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
) -> Response {
    let actor = match require_actor(actor.map(|Extension(a)| a)) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let applied = owned_audit(&services, company, id)
        .and_then(|_| services.audits.apply_differences(id, actor.actor_id()));
    match applied {
        Ok(report) => {
            let status = if report.errors.is_empty() {
                StatusCode::OK
            } else {
                StatusCode::MULTI_STATUS
            };
            (
                status,
                Json(serde_json::json!({
                    "success": report.is_success(),
                    "report": report,
                })),
            )
                .into_response()
        }
        Err(e) => errors::stock_error_to_response(e),
    }
}
