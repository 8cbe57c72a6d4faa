use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use stockledger_core::{StockItemId, WarehouseId};
use stockledger_infra::BatchPostReport;
use stockledger_inventory::{
    CatalogKey, ItemType, StockAudit, StockAuditItem, TransactionReference, TransactionType,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub warehouse_id: WarehouseId,
    /// Blank means "take the unit from the catalog".
    #[serde(default)]
    pub unit: String,
}

impl RegisterItemRequest {
    pub fn key(&self) -> CatalogKey {
        CatalogKey::new(self.item_type, self.item_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct PostTransactionRequest {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub notes: Option<String>,
    pub reference: Option<TransactionReference>,
}

/// Post against a catalog item, registering its stock item on first use.
#[derive(Debug, Deserialize)]
pub struct PostCatalogTransactionRequest {
    #[serde(flatten)]
    pub item: RegisterItemRequest,
    #[serde(flatten)]
    pub entry: PostTransactionRequest,
}

#[derive(Debug, Deserialize)]
pub struct BatchEntryRequest {
    pub stock_item_id: StockItemId,
    #[serde(flatten)]
    pub entry: PostTransactionRequest,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub entries: Vec<BatchEntryRequest>,
}

/// Column form: `stock_item_ids[i]`, `types[i]` and `quantities[i]` describe one entry.
#[derive(Debug, Deserialize)]
pub struct BatchColumnsRequest {
    pub stock_item_ids: Vec<StockItemId>,
    pub types: Vec<TransactionType>,
    pub quantities: Vec<Decimal>,
    pub notes: Option<String>,
    pub reference: Option<TransactionReference>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceParams {
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    /// Comma-separated stock item ids.
    pub stock_item_ids: Option<String>,
    pub item_type: Option<String>,
    pub warehouse_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAuditRequest {
    pub warehouse_id: WarehouseId,
}

#[derive(Debug, Deserialize)]
pub struct AddAuditItemRequest {
    pub stock_item_id: StockItemId,
}

#[derive(Debug, Deserialize)]
pub struct RecordCountRequest {
    pub actual_quantity: Decimal,
}

// -------------------------
// Response mapping
// -------------------------

pub fn batch_report_json(report: &BatchPostReport) -> Value {
    let results: Vec<Value> = report
        .results
        .iter()
        .map(|result| match result {
            Ok(transaction) => json!({ "ok": true, "transaction": transaction }),
            Err(failure) => json!({
                "ok": false,
                "stock_item_id": failure.stock_item_id,
                "item_name": failure.item_name,
                "error": failure.error.to_string(),
            }),
        })
        .collect();

    json!({
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "results": results,
    })
}

pub fn audit_json(audit: &StockAudit, items: &[StockAuditItem]) -> Value {
    json!({
        "audit": audit,
        "items": items,
    })
}
