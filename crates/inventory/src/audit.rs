use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AuditId, AuditItemId, CompanyId, DomainError, DomainResult, StockItemId, WarehouseId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditItemStatus {
    /// Not counted yet.
    Pending,
    /// Counted, matches expectation.
    Completed,
    /// Counted, differs from expectation.
    Discrepancy,
}

/// A physical count of one warehouse.
///
/// Lifecycle: `pending -> completed`, one-way. Items can be added and counted
/// only while pending; differences can be applied only once completed; the
/// audit can be deleted only while pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    pub id: AuditId,
    pub company_id: CompanyId,
    pub warehouse_id: WarehouseId,
    pub status: AuditStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl StockAudit {
    pub fn open(company_id: CompanyId, warehouse_id: WarehouseId, at: DateTime<Utc>) -> Self {
        Self {
            id: AuditId::new(),
            company_id,
            warehouse_id,
            status: AuditStatus::Pending,
            created_at: at,
            completed_at: None,
            version: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AuditStatus::Completed
    }

    /// Next state after completing the audit.
    pub fn complete(&self, at: DateTime<Utc>) -> DomainResult<Self> {
        if self.is_completed() {
            return Err(DomainError::conflict(format!(
                "audit {} is already completed",
                self.id
            )));
        }
        Ok(Self {
            status: AuditStatus::Completed,
            completed_at: Some(at),
            version: self.version + 1,
            ..self.clone()
        })
    }

    pub fn ensure_pending(&self) -> DomainResult<()> {
        if self.is_completed() {
            return Err(DomainError::conflict(format!(
                "audit {} is completed and can no longer be edited",
                self.id
            )));
        }
        Ok(())
    }

    pub fn ensure_applicable(&self) -> DomainResult<()> {
        if !self.is_completed() {
            return Err(DomainError::conflict(format!(
                "audit {} must be completed before differences are applied",
                self.id
            )));
        }
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.is_completed() {
            return Err(DomainError::conflict(format!(
                "audit {} is completed and cannot be deleted",
                self.id
            )));
        }
        Ok(())
    }
}

/// One counted line of an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAuditItem {
    pub id: AuditItemId,
    pub audit_id: AuditId,
    pub stock_item_id: StockItemId,
    pub expected_quantity: Decimal,
    pub actual_quantity: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub status: AuditItemStatus,
}

impl StockAuditItem {
    pub fn new(audit_id: AuditId, stock_item_id: StockItemId, expected_quantity: Decimal) -> Self {
        Self {
            id: AuditItemId::new(),
            audit_id,
            stock_item_id,
            expected_quantity,
            actual_quantity: None,
            difference: None,
            status: AuditItemStatus::Pending,
        }
    }

    /// Record the physically counted quantity.
    ///
    /// `difference` is derived here and stored; nothing downstream recomputes it.
    pub fn record_count(&self, actual_quantity: Decimal) -> DomainResult<Self> {
        if actual_quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "counted quantity for stock item {} cannot be negative (got {actual_quantity})",
                self.stock_item_id
            )));
        }
        let difference = actual_quantity
            .checked_sub(self.expected_quantity)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "counted quantity {actual_quantity} for stock item {} is out of range",
                    self.stock_item_id
                ))
            })?;
        let status = if difference.is_zero() {
            AuditItemStatus::Completed
        } else {
            AuditItemStatus::Discrepancy
        };
        Ok(Self {
            actual_quantity: Some(actual_quantity),
            difference: Some(difference),
            status,
            ..self.clone()
        })
    }

    /// Counted quantity, if this line takes part in reconciliation.
    pub fn reconcilable_quantity(&self) -> Option<Decimal> {
        match self.status {
            AuditItemStatus::Completed | AuditItemStatus::Discrepancy => self.actual_quantity,
            AuditItemStatus::Pending => None,
        }
    }
}
