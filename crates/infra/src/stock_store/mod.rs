//! Storage boundary for stock items, the transaction ledger, snapshots and audits.
//!
//! Every store is synchronous and tenant-scoped by `CompanyId` on its read
//! paths. The ledger is append-only; corrections are new entries.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{
    InMemoryAuditStore, InMemorySnapshotStore, InMemoryStockItemStore, InMemoryTransactionLedger,
};
pub use r#trait::{
    AuditStore, ItemFilter, SnapshotStore, StockItemStore, StoreError, TransactionLedger,
};
