//! Service-level error model.

use chrono::NaiveDate;
use thiserror::Error;

use stockledger_core::{DomainError, StockItemId};
use stockledger_inventory::CalculationMethod;

use crate::stock_store::StoreError;

pub type StockResult<T> = Result<T, StockError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Deterministic input failure (future date, negative quantity, mismatched batch).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Lifecycle conflict or lost optimistic-concurrency race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An upstream collaborator could not answer.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("store error: {0}")]
    Store(StoreError),

    /// A reconstruction failed; carries the requested date and the method attempted.
    #[error("reconstruction of {target_date} via {method} failed: {source}")]
    Reconstruction {
        target_date: NaiveDate,
        method: CalculationMethod,
        #[source]
        source: Box<StockError>,
    },
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn in_reconstruction(self, target_date: NaiveDate, method: CalculationMethod) -> Self {
        match self {
            already @ StockError::Reconstruction { .. } => already,
            other => StockError::Reconstruction {
                target_date,
                method,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with reconstruction context peeled off.
    pub fn root(&self) -> &StockError {
        match self {
            StockError::Reconstruction { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => StockError::Validation(msg),
            DomainError::InvariantViolation(msg) => StockError::InvariantViolation(msg),
            DomainError::NotFound(what) => StockError::NotFound(what),
            DomainError::Conflict(msg) => StockError::Conflict(msg),
            DomainError::Unavailable(msg) => StockError::Unavailable(msg),
        }
    }
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) | StoreError::Duplicate(msg) => StockError::Conflict(msg),
            StoreError::NotFound(what) => StockError::NotFound(what),
            other @ StoreError::Unavailable(_) => StockError::Store(other),
        }
    }
}

/// Failure of one item inside a batch; siblings are unaffected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("stock item {stock_item_id}: {error}")]
pub struct PerItemError {
    pub stock_item_id: StockItemId,
    pub item_name: Option<String>,
    #[source]
    pub error: StockError,
}
