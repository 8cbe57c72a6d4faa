use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use stockledger_core::{
    AuditId, AuditItemId, CompanyId, ExpectedVersion, StockItemId, WarehouseId,
};
use stockledger_inventory::{
    CatalogKey, LedgerWindow, StockAudit, StockAuditItem, StockItem, StockSnapshot,
    StockTransaction, TransactionReference,
};

use super::r#trait::{
    AuditStore, ItemFilter, SnapshotStore, StockItemStore, StoreError, TransactionLedger,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    company_id: CompanyId,
    catalog: CatalogKey,
    warehouse_id: WarehouseId,
}

impl ItemKey {
    fn of(item: &StockItem) -> Self {
        Self {
            company_id: item.company_id,
            catalog: item.catalog_key(),
            warehouse_id: item.warehouse_id,
        }
    }
}

#[derive(Debug, Default)]
struct ItemTables {
    by_id: HashMap<StockItemId, StockItem>,
    by_key: HashMap<ItemKey, StockItemId>,
}

/// In-memory stock item registry.
///
/// Intended for tests/dev. The version check and the write happen under one
/// write lock, so `update_balance` is a true compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryStockItemStore {
    tables: RwLock<ItemTables>,
}

impl InMemoryStockItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockItemStore for InMemoryStockItemStore {
    fn insert(&self, item: StockItem) -> Result<StockItem, StoreError> {
        let mut tables = write(&self.tables)?;
        let key = ItemKey::of(&item);
        if let Some(existing) = tables.by_key.get(&key) {
            return Err(StoreError::Duplicate(format!(
                "catalog item {} is already tracked in warehouse {} as stock item {existing}",
                key.catalog, key.warehouse_id
            )));
        }
        if tables.by_id.contains_key(&item.id) {
            return Err(StoreError::Duplicate(format!("stock item {}", item.id)));
        }
        tables.by_key.insert(key, item.id);
        tables.by_id.insert(item.id, item.clone());
        Ok(item)
    }

    fn get(&self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        Ok(read(&self.tables)?.by_id.get(&id).cloned())
    }

    fn find_by_key(
        &self,
        company_id: CompanyId,
        key: &CatalogKey,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockItem>, StoreError> {
        let tables = read(&self.tables)?;
        let key = ItemKey {
            company_id,
            catalog: *key,
            warehouse_id,
        };
        Ok(tables
            .by_key
            .get(&key)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    fn list(&self, company_id: CompanyId, filter: &ItemFilter) -> Result<Vec<StockItem>, StoreError> {
        let tables = read(&self.tables)?;
        let mut items: Vec<StockItem> = tables
            .by_id
            .values()
            .filter(|item| item.company_id == company_id && filter.matches(item))
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    fn update_balance(
        &self,
        id: StockItemId,
        expected: ExpectedVersion,
        quantity: Decimal,
        at: DateTime<Utc>,
    ) -> Result<StockItem, StoreError> {
        let mut tables = write(&self.tables)?;
        let item = tables
            .by_id
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("stock item {id}")))?;

        if !expected.matches(item.version) {
            return Err(StoreError::Concurrency(format!(
                "stock item {id}: expected {expected:?}, found {}",
                item.version
            )));
        }

        *item = item.with_balance(quantity, at);
        Ok(item.clone())
    }
}

/// In-memory append-only ledger, bucketed per stock item.
#[derive(Debug, Default)]
pub struct InMemoryTransactionLedger {
    entries: RwLock<HashMap<StockItemId, Vec<StockTransaction>>>,
}

impl InMemoryTransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(read(&self.entries)?.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl TransactionLedger for InMemoryTransactionLedger {
    fn append(&self, transaction: StockTransaction) -> Result<StockTransaction, StoreError> {
        let mut entries = write(&self.entries)?;
        let bucket = entries.entry(transaction.stock_item_id).or_default();
        if bucket.iter().any(|e| e.id == transaction.id) {
            return Err(StoreError::Duplicate(format!("transaction {}", transaction.id)));
        }
        bucket.push(transaction.clone());
        Ok(transaction)
    }

    fn list_for_items(
        &self,
        items: &[StockItemId],
        window: LedgerWindow,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let entries = read(&self.entries)?;
        let mut out: Vec<StockTransaction> = items
            .iter()
            .filter_map(|id| entries.get(id))
            .flatten()
            .filter(|tx| window.contains(tx.timestamp))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn find_by_reference(
        &self,
        reference: &TransactionReference,
    ) -> Result<Vec<StockTransaction>, StoreError> {
        let entries = read(&self.entries)?;
        let mut out: Vec<StockTransaction> = entries
            .values()
            .flatten()
            .filter(|tx| tx.reference().as_ref() == Some(reference))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

/// In-memory snapshot store.
///
/// Snapshots are produced outside this system; `record` exists to seed
/// tests and dev setups.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<StockItemId, BTreeMap<NaiveDate, StockSnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// At most one snapshot per item per date.
    pub fn record(&self, snapshot: StockSnapshot) -> Result<StockSnapshot, StoreError> {
        let mut snapshots = write(&self.snapshots)?;
        let per_item = snapshots.entry(snapshot.stock_item_id).or_default();
        if per_item.contains_key(&snapshot.snapshot_date) {
            return Err(StoreError::Duplicate(format!(
                "snapshot for stock item {} on {}",
                snapshot.stock_item_id, snapshot.snapshot_date
            )));
        }
        per_item.insert(snapshot.snapshot_date, snapshot.clone());
        Ok(snapshot)
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn latest_on_or_before(
        &self,
        company_id: CompanyId,
        items: &[StockItemId],
        on_or_before: NaiveDate,
    ) -> Result<HashMap<StockItemId, StockSnapshot>, StoreError> {
        let snapshots = read(&self.snapshots)?;
        Ok(items
            .iter()
            .filter_map(|id| snapshots.get(id))
            .filter_map(|per_item| per_item.range(..=on_or_before).next_back())
            .map(|(_, snap)| snap)
            .filter(|snap| snap.company_id == company_id)
            .map(|snap| (snap.stock_item_id, snap.clone()))
            .collect())
    }

    fn earliest_snapshot_date(&self, company_id: CompanyId) -> Result<Option<NaiveDate>, StoreError> {
        let snapshots = read(&self.snapshots)?;
        Ok(snapshots
            .values()
            .flat_map(|per_item| per_item.values())
            .filter(|snap| snap.company_id == company_id)
            .map(|snap| snap.snapshot_date)
            .min())
    }
}

#[derive(Debug, Default)]
struct AuditTables {
    audits: HashMap<AuditId, StockAudit>,
    items: HashMap<AuditItemId, StockAuditItem>,
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    tables: RwLock<AuditTables>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for InMemoryAuditStore {
    fn insert_audit(&self, audit: StockAudit) -> Result<StockAudit, StoreError> {
        let mut tables = write(&self.tables)?;
        if tables.audits.contains_key(&audit.id) {
            return Err(StoreError::Duplicate(format!("audit {}", audit.id)));
        }
        tables.audits.insert(audit.id, audit.clone());
        Ok(audit)
    }

    fn get_audit(&self, id: AuditId) -> Result<Option<StockAudit>, StoreError> {
        Ok(read(&self.tables)?.audits.get(&id).cloned())
    }

    fn update_audit(
        &self,
        audit: StockAudit,
        expected: ExpectedVersion,
    ) -> Result<StockAudit, StoreError> {
        let mut tables = write(&self.tables)?;
        let stored = tables
            .audits
            .get_mut(&audit.id)
            .ok_or_else(|| StoreError::NotFound(format!("audit {}", audit.id)))?;
        if !expected.matches(stored.version) {
            return Err(StoreError::Concurrency(format!(
                "audit {}: expected {expected:?}, found {}",
                audit.id, stored.version
            )));
        }
        *stored = audit.clone();
        Ok(audit)
    }

    fn delete_audit(&self, id: AuditId, expected: ExpectedVersion) -> Result<usize, StoreError> {
        let mut tables = write(&self.tables)?;
        let stored = tables
            .audits
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("audit {id}")))?;
        if !expected.matches(stored.version) {
            return Err(StoreError::Concurrency(format!(
                "audit {id}: expected {expected:?}, found {}",
                stored.version
            )));
        }
        tables.audits.remove(&id);
        let before = tables.items.len();
        tables.items.retain(|_, line| line.audit_id != id);
        Ok(before - tables.items.len())
    }

    fn upsert_item(&self, item: StockAuditItem) -> Result<StockAuditItem, StoreError> {
        let mut tables = write(&self.tables)?;
        if !tables.audits.contains_key(&item.audit_id) {
            return Err(StoreError::NotFound(format!("audit {}", item.audit_id)));
        }
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    fn get_item(&self, id: AuditItemId) -> Result<Option<StockAuditItem>, StoreError> {
        Ok(read(&self.tables)?.items.get(&id).cloned())
    }

    fn list_items(&self, audit_id: AuditId) -> Result<Vec<StockAuditItem>, StoreError> {
        let tables = read(&self.tables)?;
        let mut items: Vec<StockAuditItem> = tables
            .items
            .values()
            .filter(|line| line.audit_id == audit_id)
            .cloned()
            .collect();
        items.sort_by_key(|line| line.id);
        Ok(items)
    }
}
