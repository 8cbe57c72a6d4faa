use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;

use stockledger_core::StockItemId;
use stockledger_infra::stock_store::ItemFilter;
use stockledger_infra::{
    BalanceQuery, BatchColumns, BatchPostReport, PerItemError, PostCatalogTransaction, StockError,
};
use stockledger_inventory::{ItemType, PostTransaction, RegisterStockItem, StockTransaction};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, CompanyContext};
use crate::middleware::require_actor;

pub fn router() -> Router {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/items", post(register_item))
        .route("/items/:id", get(get_item))
        .route("/items/:id/history", get(get_history))
        .route("/items/:id/verify", get(verify_item))
        .route("/items/:id/transactions", post(post_transaction))
        .route("/transactions", post(post_catalog_transaction))
        .route("/transactions/batch", post(post_batch))
        .route("/transactions/batch/columns", post(post_batch_columns))
}

pub async fn get_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Query(params): Query<dto::BalanceParams>,
) -> Response {
    let query = match balance_query(company, params) {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services.engine.get_balance(&query) {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

fn balance_query(company: CompanyContext, params: dto::BalanceParams) -> Result<BalanceQuery, Response> {
    let Some(date) = params.date else {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "date query parameter is required (YYYY-MM-DD)",
        ));
    };
    let target_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("date must be YYYY-MM-DD (got '{date}')"),
        )
    })?;

    let mut filter = ItemFilter::all();
    if let Some(ids) = params.stock_item_ids {
        let ids = ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<StockItemId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| errors::invalid_id("stock_item_ids"))?;
        filter.stock_item_ids = Some(ids);
    }
    if let Some(item_type) = params.item_type {
        let item_type: ItemType = item_type
            .parse()
            .map_err(|e| errors::stock_error_to_response(StockError::from(e)))?;
        filter.item_type = Some(item_type);
    }
    if let Some(warehouse_id) = params.warehouse_id {
        filter.warehouse_id = Some(
            warehouse_id
                .trim()
                .parse()
                .map_err(|_| errors::invalid_id("warehouse_id"))?,
        );
    }

    Ok(BalanceQuery::new(company.company_id(), target_date).with_filter(filter))
}

pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Json(body): Json<dto::RegisterItemRequest>,
) -> Response {
    let cmd = RegisterStockItem {
        company_id: company.company_id(),
        key: body.key(),
        warehouse_id: body.warehouse_id,
        unit: body.unit,
    };

    match services.stock.register(&cmd) {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.owned_item(company.company_id(), id) {
        Ok(item) => Json(item).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn get_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let history = services
        .owned_item(company.company_id(), id)
        .and_then(|_| services.stock.history(id));
    match history {
        Ok(entries) => Json(serde_json::json!({
            "stock_item_id": id,
            "transactions": entries,
        }))
        .into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn verify_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let verification = services
        .owned_item(company.company_id(), id)
        .and_then(|_| services.stock.verify_item(id));
    match verification {
        Ok(v) => Json(serde_json::json!({
            "verification": v,
            "consistent": v.is_consistent(),
        }))
        .into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn post_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    actor: Option<Extension<ActorContext>>,
    Path(id): Path<String>,
    Json(body): Json<dto::PostTransactionRequest>,
) -> Response {
    let actor = match require_actor(actor.map(|Extension(a)| a)) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id = match parse_item_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = PostTransaction {
        stock_item_id: id,
        transaction_type: body.transaction_type,
        quantity: body.quantity,
        actor_id: actor.actor_id(),
        notes: body.notes,
        reference: body.reference,
    };

    let posted = services
        .owned_item(company.company_id(), id)
        .and_then(|_| services.stock.post(&cmd));
    match posted {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn post_catalog_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::PostCatalogTransactionRequest>,
) -> Response {
    let actor = match require_actor(actor.map(|Extension(a)| a)) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let cmd = PostCatalogTransaction {
        item: RegisterStockItem {
            company_id: company.company_id(),
            key: body.item.key(),
            warehouse_id: body.item.warehouse_id,
            unit: body.item.unit,
        },
        transaction_type: body.entry.transaction_type,
        quantity: body.entry.quantity,
        actor_id: actor.actor_id(),
        notes: body.entry.notes,
        reference: body.entry.reference,
    };

    match services.stock.post_for_catalog_item(&cmd) {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}

pub async fn post_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::BatchRequest>,
) -> Response {
    let actor = match require_actor(actor.map(|Extension(a)| a)) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let cmds: Vec<PostTransaction> = body
        .entries
        .into_iter()
        .map(|row| PostTransaction {
            stock_item_id: row.stock_item_id,
            transaction_type: row.entry.transaction_type,
            quantity: row.entry.quantity,
            actor_id: actor.actor_id(),
            notes: row.entry.notes,
            reference: row.entry.reference,
        })
        .collect();

    let report = post_owned(&services, company, cmds);
    Json(dto::batch_report_json(&report)).into_response()
}

pub async fn post_batch_columns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    actor: Option<Extension<ActorContext>>,
    Json(body): Json<dto::BatchColumnsRequest>,
) -> Response {
    let actor = match require_actor(actor.map(|Extension(a)| a)) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    let columns = BatchColumns {
        stock_item_ids: body.stock_item_ids,
        transaction_types: body.types,
        quantities: body.quantities,
        actor_id: actor.actor_id(),
        notes: body.notes,
        reference: body.reference,
    };
    let cmds = match columns.into_commands() {
        Ok(cmds) => cmds,
        Err(e) => return errors::stock_error_to_response(e),
    };

    let report = post_owned(&services, company, cmds);
    Json(dto::batch_report_json(&report)).into_response()
}

/// Post a batch, failing rows whose item belongs to another company without
/// touching them.
fn post_owned(services: &AppServices, company: CompanyContext, cmds: Vec<PostTransaction>) -> BatchPostReport {
    let mut results: Vec<Option<Result<StockTransaction, PerItemError>>> = Vec::with_capacity(cmds.len());
    let mut owned = Vec::with_capacity(cmds.len());
    let mut owned_rows = Vec::with_capacity(cmds.len());

    for (row, cmd) in cmds.into_iter().enumerate() {
        match services.owned_item(company.company_id(), cmd.stock_item_id) {
            Ok(_) => {
                results.push(None);
                owned_rows.push(row);
                owned.push(cmd);
            }
            Err(error) => results.push(Some(Err(PerItemError {
                stock_item_id: cmd.stock_item_id,
                item_name: None,
                error,
            }))),
        }
    }

    let posted = services.stock.post_batch(&owned);
    for (row, result) in owned_rows.into_iter().zip(posted.results) {
        results[row] = Some(result);
    }

    BatchPostReport {
        results: results.into_iter().flatten().collect(),
    }
}

fn parse_item_id(raw: &str) -> Result<StockItemId, Response> {
    raw.parse().map_err(|_| errors::invalid_id("stock item id"))
}
