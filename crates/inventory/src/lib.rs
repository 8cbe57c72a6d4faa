//! Inventory domain module (ledger + snapshots + audits).
//!
//! This crate contains business rules for stock tracking, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage):
//! - the closed set of transaction types and their balance effect
//! - stock item, transaction and snapshot records
//! - the audit lifecycle
//! - backward/forward replay used to reconstruct historical balances

pub mod audit;
pub mod item;
pub mod replay;
pub mod snapshot;
pub mod transaction;

pub use audit::{AuditItemStatus, AuditStatus, StockAudit, StockAuditItem};
pub use item::{CatalogKey, ItemType, RegisterStockItem, StockItem};
pub use replay::{
    CalculationMethod, LedgerWindow, ReplayStrategy, Replayed, clamp_for_display, end_of_day,
    replay_backward, replay_forward, select_strategy, start_of_day,
};
pub use snapshot::StockSnapshot;
pub use transaction::{PostTransaction, StockTransaction, TransactionReference, TransactionType};
