//! Infrastructure layer: stores, the catalog boundary, configuration, and the
//! services that compose them (ledger posting, balance reconstruction, audit
//! reconciliation).

pub mod audit_service;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger_service;
pub mod reconstruction;
pub mod stock_store;

mod integration_tests;

pub use audit_service::{AuditApplyReport, AuditItemError, AuditReconciliation};
pub use config::{ConfigError, StockConfig};
pub use error::{PerItemError, StockError, StockResult};
pub use ledger_service::{
    BalanceOverwrite, BalanceVerification, BatchColumns, BatchPostReport, PostCatalogTransaction,
    StockLedger,
};
pub use reconstruction::{BalanceDetails, BalanceLine, BalanceQuery, BalanceReport, ReconstructionEngine};
