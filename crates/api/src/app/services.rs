//! Service wiring for the HTTP layer.
//!
//! Everything is held in memory; stores, catalog and snapshot table are
//! shared by the ledger, the reconstruction engine and audit reconciliation.

use std::sync::Arc;

use stockledger_core::{Clock, CompanyId, StockItemId, SystemClock};
use stockledger_infra::catalog::{BulkWithFallback, InMemoryItemCatalog};
use stockledger_infra::stock_store::{
    InMemoryAuditStore, InMemorySnapshotStore, InMemoryStockItemStore, InMemoryTransactionLedger,
    StockItemStore,
};
use stockledger_infra::{
    AuditReconciliation, ReconstructionEngine, StockConfig, StockError, StockLedger, StockResult,
};
use stockledger_inventory::StockItem;

pub type Items = Arc<InMemoryStockItemStore>;
pub type Ledger = Arc<InMemoryTransactionLedger>;
pub type Snapshots = Arc<InMemorySnapshotStore>;
pub type Resolver = Arc<BulkWithFallback<Arc<InMemoryItemCatalog>>>;

pub type Stock = StockLedger<Items, Ledger, Resolver>;
pub type Engine = ReconstructionEngine<Items, Ledger, Snapshots, Resolver>;
pub type Audits = AuditReconciliation<Arc<InMemoryAuditStore>, Items, Ledger, Resolver>;

pub struct AppServices {
    pub stock: Arc<Stock>,
    pub engine: Engine,
    pub audits: Audits,
    pub catalog: Arc<InMemoryItemCatalog>,
    pub snapshots: Snapshots,
}

impl AppServices {
    pub fn in_memory(config: StockConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StockConfig, clock: Arc<dyn Clock>) -> Self {
        let items: Items = Arc::new(InMemoryStockItemStore::new());
        let ledger: Ledger = Arc::new(InMemoryTransactionLedger::new());
        let snapshots: Snapshots = Arc::new(InMemorySnapshotStore::new());
        let catalog = Arc::new(InMemoryItemCatalog::new());
        let resolver: Resolver = Arc::new(BulkWithFallback::new(catalog.clone()));

        let stock = Arc::new(
            StockLedger::new(items.clone(), ledger.clone(), resolver.clone(), clock.clone())
                .with_config(config),
        );
        let engine = ReconstructionEngine::new(items, ledger, snapshots.clone(), resolver, clock)
            .with_config(config);
        let audits = AuditReconciliation::new(Arc::new(InMemoryAuditStore::new()), stock.clone());

        Self {
            stock,
            engine,
            audits,
            catalog,
            snapshots,
        }
    }

    /// Load a stock item, hiding items owned by other companies.
    pub fn owned_item(&self, company_id: CompanyId, id: StockItemId) -> StockResult<StockItem> {
        match self.stock.items().get(id)? {
            Some(item) if item.company_id == company_id => Ok(item),
            _ => Err(StockError::not_found(format!("stock item {id}"))),
        }
    }
}
