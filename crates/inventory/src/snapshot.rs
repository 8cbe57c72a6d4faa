use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{CompanyId, SnapshotId, StockItemId};

/// Checkpoint of one stock item's balance at end of `snapshot_date`.
///
/// Produced by an external periodic job; never revised once written. Many
/// rows share a `snapshot_date` (one per stock item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub id: SnapshotId,
    pub company_id: CompanyId,
    pub stock_item_id: StockItemId,
    pub snapshot_date: NaiveDate,
    pub quantity: Decimal,
}

impl StockSnapshot {
    pub fn new(
        company_id: CompanyId,
        stock_item_id: StockItemId,
        snapshot_date: NaiveDate,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            company_id,
            stock_item_id,
            snapshot_date,
            quantity,
        }
    }
}
