use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{AuditId, AuditItemId, CompanyId, ExpectedVersion, StockItemId, WarehouseId};
use stockledger_inventory::{
    CatalogKey, ItemType, LedgerWindow, StockAudit, StockAuditItem, StockItem, StockSnapshot,
    StockTransaction, TransactionReference,
};

/// Store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, lifecycle).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Conditional write lost against a concurrent writer.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Which stock items a query covers (all conditions must hold).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub stock_item_ids: Option<Vec<StockItemId>>,
    pub item_type: Option<ItemType>,
    pub warehouse_id: Option<WarehouseId>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn single(stock_item_id: StockItemId) -> Self {
        Self {
            stock_item_ids: Some(vec![stock_item_id]),
            ..Self::default()
        }
    }

    pub fn matches(&self, item: &StockItem) -> bool {
        self.stock_item_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&item.id))
            && self.item_type.is_none_or(|t| t == item.item_type)
            && self.warehouse_id.is_none_or(|w| w == item.warehouse_id)
    }
}

/// Registry of tracked stock items and their cached balances.
///
/// Balance writes are conditional on the version the writer read; losing
/// writers get `StoreError::Concurrency` and are expected to re-read and retry.
pub trait StockItemStore: Send + Sync {
    /// Insert a new item. Fails with `Duplicate` if the company already tracks
    /// the same catalog item in the same warehouse.
    fn insert(&self, item: StockItem) -> Result<StockItem, StoreError>;

    fn get(&self, id: StockItemId) -> Result<Option<StockItem>, StoreError>;

    fn find_by_key(
        &self,
        company_id: CompanyId,
        key: &CatalogKey,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockItem>, StoreError>;

    /// Items of a company matching `filter`, ordered by id.
    fn list(&self, company_id: CompanyId, filter: &ItemFilter) -> Result<Vec<StockItem>, StoreError>;

    /// Set `current_quantity` if the stored version matches `expected`.
    fn update_balance(
        &self,
        id: StockItemId,
        expected: ExpectedVersion,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError>;
}

/// Append-only transaction ledger.
pub trait TransactionLedger: Send + Sync {
    fn append(&self, transaction: StockTransaction) -> Result<StockTransaction, StoreError>;

    /// Entries of all `items` inside `window`, ordered by timestamp.
    ///
    /// One call covers the whole item set; callers must not loop per item.
    fn list_for_items(
        &self,
        items: &[StockItemId],
        window: LedgerWindow,
    ) -> Result<Vec<StockTransaction>, StoreError>;

    /// Entries caused by `reference`, ordered by timestamp.
    fn find_by_reference(
        &self,
        reference: &TransactionReference,
    ) -> Result<Vec<StockTransaction>, StoreError>;
}

/// Read side of the snapshot store. Snapshots are written by an external job.
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot per item with `snapshot_date <= on_or_before`.
    ///
    /// Items without such a snapshot are absent from the result.
    fn latest_on_or_before(
        &self,
        company_id: CompanyId,
        items: &[StockItemId],
        on_or_before: NaiveDate,
    ) -> Result<HashMap<StockItemId, StockSnapshot>, StoreError>;

    fn earliest_snapshot_date(&self, company_id: CompanyId) -> Result<Option<NaiveDate>, StoreError>;
}

/// Audits and their counted lines.
pub trait AuditStore: Send + Sync {
    fn insert_audit(&self, audit: StockAudit) -> Result<StockAudit, StoreError>;

    fn get_audit(&self, id: AuditId) -> Result<Option<StockAudit>, StoreError>;

    /// Replace an audit if the stored version matches `expected`.
    fn update_audit(
        &self,
        audit: StockAudit,
        expected: ExpectedVersion,
    ) -> Result<StockAudit, StoreError>;

    /// Delete an audit and all of its lines; returns the number of lines removed.
    fn delete_audit(&self, id: AuditId, expected: ExpectedVersion) -> Result<usize, StoreError>;

    fn upsert_item(&self, item: StockAuditItem) -> Result<StockAuditItem, StoreError>;

    fn get_item(&self, id: AuditItemId) -> Result<Option<StockAuditItem>, StoreError>;

    fn list_items(&self, audit_id: AuditId) -> Result<Vec<StockAuditItem>, StoreError>;
}

impl<S> StockItemStore for Arc<S>
where
    S: StockItemStore + ?Sized,
{
    fn insert(&self, item: StockItem) -> Result<StockItem, StoreError> {
        (**self).insert(item)
    }

    fn get(&self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        (**self).get(id)
    }

    fn find_by_key(
        &self,
        company_id: CompanyId,
        key: &CatalogKey,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockItem>, StoreError> {
        (**self).find_by_key(company_id, key, warehouse_id)
    }

    fn list(&self, company_id: CompanyId, filter: &ItemFilter) -> Result<Vec<StockItem>, StoreError> {
        (**self).list(company_id, filter)
    }

    fn update_balance(
        &self,
        id: StockItemId,
        expected: ExpectedVersion,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        (**self).update_balance(id, expected, quantity, at)
    }
}

impl<S> TransactionLedger for Arc<S>
where
    S: TransactionLedger + ?Sized,
{
    fn append(&self, transaction: StockTransaction) -> Result<StockTransaction, StoreError> {
        (**self).append(transaction)
    }

    fn list_for_items(
        &self,
        items: &[StockItemId],
        window: LedgerWindow,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).list_for_items(items, window)
    }

    fn find_by_reference(
        &self,
        reference: &TransactionReference,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).find_by_reference(reference)
    }
}

impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    fn latest_on_or_before(
        &self,
        company_id: CompanyId,
        items: &[StockItemId],
        on_or_before: NaiveDate,
    ) -> Result<HashMap<StockItemId, StockSnapshot>, StoreError> {
        (**self).latest_on_or_before(company_id, items, on_or_before)
    }

    fn earliest_snapshot_date(&self, company_id: CompanyId) -> Result<Option<NaiveDate>, StoreError> {
        (**self).earliest_snapshot_date(company_id)
    }
}

impl<S> AuditStore for Arc<S>
where
    S: AuditStore + ?Sized,
{
    fn insert_audit(&self, audit: StockAudit) -> Result<StockAudit, StoreError> {
        (**self).insert_audit(audit)
    }

    fn get_audit(&self, id: AuditId) -> Result<Option<StockAudit>, StoreError> {
        (**self).get_audit(id)
    }

    fn update_audit(
        &self,
        audit: StockAudit,
        expected: ExpectedVersion,
    ) -> Result<StockAudit, StoreError> {
        (**self).update_audit(audit, expected)
    }

    fn delete_audit(&self, id: AuditId, expected: ExpectedVersion) -> Result<usize, StoreError> {
        (**self).delete_audit(id, expected)
    }

    fn upsert_item(&self, item: StockAuditItem) -> Result<StockAuditItem, StoreError> {
        (**self).upsert_item(item)
    }

    fn get_item(&self, id: AuditItemId) -> Result<Option<StockAuditItem>, StoreError> {
        (**self).get_item(id)
    }

    fn list_items(&self, audit_id: AuditId) -> Result<Vec<StockAuditItem>, StoreError> {
        (**self).list_items(audit_id)
    }
}
