//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, optimistic concurrency expectations and
//! the clock abstraction used to stamp ledger entries.

pub mod clock;
pub mod concurrency;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use concurrency::ExpectedVersion;
pub use error::{DomainError, DomainResult};
pub use id::{
    AuditId, AuditItemId, CompanyId, SnapshotId, StockItemId, TransactionId, UserId, WarehouseId,
};
