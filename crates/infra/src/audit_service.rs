//! Audit reconciliation: physical counts turned into corrective ledger entries.
//!
//! An audit collects counted lines while pending, is completed once, and then
//! its differences are applied item by item. Applying overwrites each counted
//! item's balance with the counted quantity and appends an `adjustment` for the
//! signed difference, referencing the audit. One item's failure never blocks
//! the others.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockledger_core::{
    AuditId, AuditItemId, CompanyId, ExpectedVersion, StockItemId, UserId, WarehouseId,
};
use stockledger_inventory::{StockAudit, StockAuditItem, TransactionReference};

use crate::catalog::ItemDetailsResolver;
use crate::error::{StockError, StockResult};
use crate::ledger_service::StockLedger;
use crate::stock_store::{AuditStore, StockItemStore, TransactionLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditItemError {
    pub audit_item_id: AuditItemId,
    pub stock_item_id: StockItemId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditApplyReport {
    pub audit_id: AuditId,
    pub updated_count: usize,
    pub errors: Vec<AuditItemError>,
    /// Items that already carried an adjustment from this audit before this
    /// call. Their balance is unchanged by re-applying, but the ledger now
    /// holds one more (zero-delta) adjustment entry for them.
    pub reapplied_items: Vec<StockItemId>,
    /// Lines without a recorded count.
    pub skipped: usize,
}

impl AuditApplyReport {
    pub fn is_success(&self) -> bool {
        self.updated_count > 0
    }
}

pub struct AuditReconciliation<A, I, L, R> {
    audits: A,
    stock: Arc<StockLedger<I, L, R>>,
}

impl<A, I, L, R> AuditReconciliation<A, I, L, R>
where
    A: AuditStore,
    I: StockItemStore,
    L: TransactionLedger,
    R: ItemDetailsResolver,
{
    pub fn new(audits: A, stock: Arc<StockLedger<I, L, R>>) -> Self {
        Self { audits, stock }
    }

    pub fn open_audit(&self, company_id: CompanyId, warehouse_id: WarehouseId) -> StockResult<StockAudit> {
        let audit = self
            .audits
            .insert_audit(StockAudit::open(company_id, warehouse_id, self.stock.clock().now()))?;
        info!(audit_id = %audit.id, company_id = %company_id, warehouse_id = %warehouse_id, "stock audit opened");
        Ok(audit)
    }

    pub fn get_audit(&self, id: AuditId) -> StockResult<StockAudit> {
        self.audits
            .get_audit(id)?
            .ok_or_else(|| StockError::not_found(format!("audit {id}")))
    }

    pub fn list_items(&self, audit_id: AuditId) -> StockResult<Vec<StockAuditItem>> {
        self.get_audit(audit_id)?;
        Ok(self.audits.list_items(audit_id)?)
    }

    /// Add a stock item to a pending audit, expecting its current balance.
    pub fn add_item(&self, audit_id: AuditId, stock_item_id: StockItemId) -> StockResult<StockAuditItem> {
        let audit = self.get_audit(audit_id)?;
        audit.ensure_pending()?;

        let item = self.stock.stock_item(stock_item_id)?;
        if item.company_id != audit.company_id || item.warehouse_id != audit.warehouse_id {
            return Err(StockError::validation(format!(
                "stock item {stock_item_id} is not in warehouse {} of audit {audit_id}",
                audit.warehouse_id
            )));
        }
        if self
            .audits
            .list_items(audit_id)?
            .iter()
            .any(|line| line.stock_item_id == stock_item_id)
        {
            return Err(StockError::conflict(format!(
                "stock item {stock_item_id} is already part of audit {audit_id}"
            )));
        }

        Ok(self
            .audits
            .upsert_item(StockAuditItem::new(audit_id, stock_item_id, item.current_quantity))?)
    }

    pub fn record_count(
        &self,
        audit_id: AuditId,
        audit_item_id: AuditItemId,
        actual_quantity: Decimal,
    ) -> StockResult<StockAuditItem> {
        let audit = self.get_audit(audit_id)?;
        audit.ensure_pending()?;

        let line = self
            .audits
            .get_item(audit_item_id)?
            .filter(|line| line.audit_id == audit_id)
            .ok_or_else(|| StockError::not_found(format!("audit item {audit_item_id} in audit {audit_id}")))?;

        Ok(self.audits.upsert_item(line.record_count(actual_quantity)?)?)
    }

    /// `pending -> completed`. Completing twice is a conflict.
    pub fn complete_audit(&self, audit_id: AuditId) -> StockResult<StockAudit> {
        let audit = self.get_audit(audit_id)?;
        let completed = audit.complete(self.stock.clock().now())?;
        let stored = self
            .audits
            .update_audit(completed, ExpectedVersion::Exact(audit.version))?;
        info!(audit_id = %audit_id, "stock audit completed");
        Ok(stored)
    }

    /// Overwrite balances with counted quantities, item by item.
    pub fn apply_differences(&self, audit_id: AuditId, actor_id: UserId) -> StockResult<AuditApplyReport> {
        let audit = self.get_audit(audit_id)?;
        audit.ensure_applicable()?;

        let lines = self.audits.list_items(audit_id)?;
        let reference = TransactionReference::audit(audit_id);
        let already_adjusted: HashSet<StockItemId> = self
            .stock
            .ledger()
            .find_by_reference(&reference)?
            .into_iter()
            .map(|tx| tx.stock_item_id)
            .collect();

        let mut report = AuditApplyReport {
            audit_id,
            updated_count: 0,
            errors: vec![],
            reapplied_items: vec![],
            skipped: 0,
        };

        for line in lines {
            let Some(actual) = line.reconcilable_quantity() else {
                report.skipped += 1;
                continue;
            };

            match self.apply_line(&audit, &line, actual, actor_id, &reference) {
                Ok(()) => {
                    report.updated_count += 1;
                    if already_adjusted.contains(&line.stock_item_id) {
                        warn!(
                            audit_id = %audit_id,
                            stock_item_id = %line.stock_item_id,
                            "audit differences re-applied; item now has more than one adjustment from this audit"
                        );
                        report.reapplied_items.push(line.stock_item_id);
                    }
                }
                Err(err) => {
                    warn!(audit_id = %audit_id, stock_item_id = %line.stock_item_id, error = %err, "audit line not applied");
                    report.errors.push(AuditItemError {
                        audit_item_id: line.id,
                        stock_item_id: line.stock_item_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            audit_id = %audit_id,
            updated = report.updated_count,
            failed = report.errors.len(),
            skipped = report.skipped,
            "audit differences applied"
        );
        Ok(report)
    }

    /// Delete a pending audit and its lines.
    pub fn delete_audit(&self, audit_id: AuditId) -> StockResult<usize> {
        let audit = self.get_audit(audit_id)?;
        audit.ensure_deletable()?;
        let removed = self
            .audits
            .delete_audit(audit_id, ExpectedVersion::Exact(audit.version))?;
        info!(audit_id = %audit_id, lines = removed, "stock audit deleted");
        Ok(removed)
    }

    fn apply_line(
        &self,
        audit: &StockAudit,
        line: &StockAuditItem,
        actual: Decimal,
        actor_id: UserId,
        reference: &TransactionReference,
    ) -> StockResult<()> {
        let item = self.stock.stock_item(line.stock_item_id)?;
        if item.warehouse_id != audit.warehouse_id {
            return Err(StockError::conflict(format!(
                "stock item {} is in warehouse {}, audit {} counted warehouse {}",
                item.id, item.warehouse_id, audit.id, audit.warehouse_id
            )));
        }
        self.stock.overwrite_balance(
            item.id,
            actual,
            actor_id,
            reference.clone(),
            Some(format!("stock audit {}", audit.id)),
        )?;
        Ok(())
    }
}
