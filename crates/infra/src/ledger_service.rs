//! Write path: posting ledger entries and keeping cached balances in step.
//!
//! Every write is a per-item unit: a conditional balance update (compare-and-set
//! on `StockItem.version`, retried on conflict) followed by the ledger append.
//! If the append fails the balance change is reverted. Items never block each
//! other; batch calls report per-item outcomes.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use stockledger_core::{Clock, ExpectedVersion, StockItemId, UserId};
use stockledger_inventory::{
    CatalogKey, LedgerWindow, PostTransaction, RegisterStockItem, StockItem, StockTransaction,
    TransactionReference, TransactionType,
};

use crate::catalog::ItemDetailsResolver;
use crate::config::StockConfig;
use crate::error::{PerItemError, StockError, StockResult};
use crate::stock_store::{StockItemStore, StoreError, TransactionLedger};

/// Post against a catalog item, registering its stock item on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCatalogTransaction {
    pub item: RegisterStockItem,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
    pub reference: Option<TransactionReference>,
}

/// Batch posting in column form. All columns must have the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchColumns {
    pub stock_item_ids: Vec<StockItemId>,
    pub transaction_types: Vec<TransactionType>,
    pub quantities: Vec<Decimal>,
    pub actor_id: UserId,
    pub notes: Option<String>,
    pub reference: Option<TransactionReference>,
}

impl BatchColumns {
    /// Zip the columns into one command per row.
    pub fn into_commands(self) -> StockResult<Vec<PostTransaction>> {
        let n = self.stock_item_ids.len();
        if self.transaction_types.len() != n || self.quantities.len() != n {
            return Err(StockError::validation(format!(
                "batch columns differ in length (stock_item_ids: {n}, types: {}, quantities: {})",
                self.transaction_types.len(),
                self.quantities.len()
            )));
        }
        Ok(self
            .stock_item_ids
            .into_iter()
            .zip(self.transaction_types)
            .zip(self.quantities)
            .map(|((stock_item_id, transaction_type), quantity)| PostTransaction {
                stock_item_id,
                transaction_type,
                quantity,
                actor_id: self.actor_id,
                notes: self.notes.clone(),
                reference: self.reference.clone(),
            })
            .collect())
    }
}

/// Per-item outcomes of a batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPostReport {
    pub results: Vec<Result<StockTransaction, PerItemError>>,
}

impl BatchPostReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn errors(&self) -> impl Iterator<Item = &PerItemError> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

/// Result of forcing a balance to a counted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceOverwrite {
    pub previous_quantity: Decimal,
    pub item: StockItem,
    pub transaction: StockTransaction,
}

/// Cached balance against the ledger it is supposed to summarize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceVerification {
    pub stock_item_id: StockItemId,
    pub cached_quantity: Decimal,
    pub ledger_quantity: Decimal,
    pub drift: Decimal,
    pub transactions: usize,
}

impl BalanceVerification {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

pub struct StockLedger<I, L, R> {
    items: I,
    ledger: L,
    resolver: R,
    clock: Arc<dyn Clock>,
    config: StockConfig,
}

impl<I, L, R> StockLedger<I, L, R>
where
    I: StockItemStore,
    L: TransactionLedger,
    R: ItemDetailsResolver,
{
    pub fn new(items: I, ledger: L, resolver: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            items,
            ledger,
            resolver,
            clock,
            config: StockConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    pub fn items(&self) -> &I {
        &self.items
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start tracking a catalog item in a warehouse. Idempotent.
    ///
    /// A blank unit is taken from the catalog.
    pub fn register(&self, cmd: &RegisterStockItem) -> StockResult<StockItem> {
        if let Some(existing) = self
            .items
            .find_by_key(cmd.company_id, &cmd.key, cmd.warehouse_id)?
        {
            return Ok(existing);
        }

        let mut cmd = cmd.clone();
        if cmd.unit.trim().is_empty() {
            if let Some(entry) = self.resolver.resolve(&[cmd.key]).get(&cmd.key) {
                cmd.unit = entry.unit.clone();
            }
        }

        let item = StockItem::register(&cmd, self.clock.now())?;
        match self.items.insert(item) {
            Ok(item) => {
                info!(
                    stock_item_id = %item.id,
                    company_id = %item.company_id,
                    catalog_key = %cmd.key,
                    warehouse_id = %item.warehouse_id,
                    "stock item registered"
                );
                Ok(item)
            }
            // Lost a registration race; the winner's row is the item.
            Err(StoreError::Duplicate(_)) => self
                .items
                .find_by_key(cmd.company_id, &cmd.key, cmd.warehouse_id)?
                .ok_or_else(|| {
                    StockError::conflict(format!(
                        "catalog item {} reported as registered but not found",
                        cmd.key
                    ))
                }),
            Err(err) => Err(err.into()),
        }
    }

    pub fn stock_item(&self, id: StockItemId) -> StockResult<StockItem> {
        self.items
            .get(id)?
            .ok_or_else(|| StockError::not_found(format!("stock item {id}")))
    }

    pub fn post(&self, cmd: &PostTransaction) -> StockResult<StockTransaction> {
        let delta = cmd.signed_delta()?;
        let item = self.stock_item(cmd.stock_item_id)?;
        let name = self.item_name(&item.catalog_key());
        self.post_with_name(cmd, delta, &name)
    }

    /// Post against `(company, catalog item, warehouse)`, registering it lazily.
    pub fn post_for_catalog_item(&self, cmd: &PostCatalogTransaction) -> StockResult<StockTransaction> {
        cmd.transaction_type.validate_quantity(cmd.quantity)?;
        let item = self.register(&cmd.item)?;
        self.post(&PostTransaction {
            stock_item_id: item.id,
            transaction_type: cmd.transaction_type,
            quantity: cmd.quantity,
            actor_id: cmd.actor_id,
            notes: cmd.notes.clone(),
            reference: cmd.reference.clone(),
        })
    }

    /// Post many entries. Not atomic across items: each succeeds or fails alone.
    pub fn post_batch(&self, cmds: &[PostTransaction]) -> BatchPostReport {
        let known: Vec<Result<Option<StockItem>, StoreError>> =
            cmds.iter().map(|cmd| self.items.get(cmd.stock_item_id)).collect();
        let keys: Vec<CatalogKey> = known
            .iter()
            .filter_map(|found| found.as_ref().ok().and_then(Option::as_ref))
            .map(StockItem::catalog_key)
            .collect();
        let details = self.resolver.resolve(&keys);

        let results: Vec<Result<StockTransaction, PerItemError>> = cmds
            .iter()
            .zip(known)
            .map(|(cmd, item)| {
                let name = item.as_ref().ok().and_then(Option::as_ref).map(|item| {
                    let key = item.catalog_key();
                    details
                        .get(&key)
                        .map(|entry| entry.name.clone())
                        .unwrap_or_else(|| key.to_string())
                });
                let outcome = match (item, cmd.signed_delta()) {
                    (_, Err(err)) => Err(err.into()),
                    (Err(err), Ok(_)) => Err(err.into()),
                    (Ok(None), Ok(_)) => Err(StockError::not_found(format!(
                        "stock item {}",
                        cmd.stock_item_id
                    ))),
                    (Ok(Some(_)), Ok(delta)) => {
                        self.post_with_name(cmd, delta, name.as_deref().unwrap_or_default())
                    }
                };
                outcome.map_err(|error| PerItemError {
                    stock_item_id: cmd.stock_item_id,
                    item_name: name,
                    error,
                })
            })
            .collect();

        let report = BatchPostReport { results };
        if report.failed() > 0 {
            warn!(
                succeeded = report.succeeded(),
                failed = report.failed(),
                "batch post completed with failures"
            );
        }
        report
    }

    pub fn post_batch_columns(&self, columns: BatchColumns) -> StockResult<BatchPostReport> {
        let cmds = columns.into_commands()?;
        Ok(self.post_batch(&cmds))
    }

    /// Force an item's balance to `target` and record the signed difference as
    /// an adjustment entry. The difference is computed inside the conditional
    /// write, against the balance actually replaced.
    pub fn overwrite_balance(
        &self,
        id: StockItemId,
        target: Decimal,
        actor_id: UserId,
        reference: TransactionReference,
        notes: Option<String>,
    ) -> StockResult<BalanceOverwrite> {
        let item = self.stock_item(id)?;
        let name = self.item_name(&item.catalog_key());

        let (before, after) = self.commit(id, |current| {
            target
                .checked_sub(current.current_quantity)
                .map(|_| target)
                .ok_or_else(|| {
                    StockError::validation(format!(
                        "stock item {id}: difference between {target} and {} is out of range",
                        current.current_quantity
                    ))
                })
        })?;
        let delta = after
            .current_quantity
            .checked_sub(before.current_quantity)
            .ok_or_else(|| {
                StockError::InvariantViolation(format!("stock item {id}: overwrite difference overflowed"))
            })?;
        let cmd = PostTransaction {
            stock_item_id: id,
            transaction_type: TransactionType::Adjustment,
            quantity: delta,
            actor_id,
            notes,
            reference: Some(reference),
        };
        let transaction = self.append_or_compensate(&cmd, &after, delta, &name)?;

        Ok(BalanceOverwrite {
            previous_quantity: before.current_quantity,
            item: after,
            transaction,
        })
    }

    /// An item's ledger in timestamp order.
    pub fn history(&self, id: StockItemId) -> StockResult<Vec<StockTransaction>> {
        self.stock_item(id)?;
        Ok(self.ledger.list_for_items(&[id], LedgerWindow::all())?)
    }

    /// Recompute the balance from the ledger and compare with the cached one.
    pub fn verify_item(&self, id: StockItemId) -> StockResult<BalanceVerification> {
        let item = self.stock_item(id)?;
        let entries = self.ledger.list_for_items(&[id], LedgerWindow::all())?;
        let overflow = || StockError::InvariantViolation(format!("stock item {id}: ledger sum overflows"));
        let ledger_quantity = entries
            .iter()
            .try_fold(Decimal::ZERO, |sum, tx| sum.checked_add(tx.signed_effect()))
            .ok_or_else(overflow)?;
        let drift = item
            .current_quantity
            .checked_sub(ledger_quantity)
            .ok_or_else(overflow)?;
        if !drift.is_zero() {
            warn!(
                stock_item_id = %id,
                cached = %item.current_quantity,
                ledger = %ledger_quantity,
                "cached balance drifted from ledger"
            );
        }
        Ok(BalanceVerification {
            stock_item_id: id,
            cached_quantity: item.current_quantity,
            ledger_quantity,
            drift,
            transactions: entries.len(),
        })
    }

    fn item_name(&self, key: &CatalogKey) -> String {
        self.resolver
            .resolve(std::slice::from_ref(key))
            .get(key)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    fn post_with_name(
        &self,
        cmd: &PostTransaction,
        delta: Decimal,
        name: &str,
    ) -> StockResult<StockTransaction> {
        let (_, after) = self.commit(cmd.stock_item_id, |item| {
            item.current_quantity.checked_add(delta).ok_or_else(|| {
                StockError::validation(format!(
                    "stock item {}: balance would overflow ({} + {delta})",
                    item.id, item.current_quantity
                ))
            })
        })?;
        self.append_or_compensate(cmd, &after, delta, name)
    }

    /// Conditional read-modify-write of one item's balance.
    ///
    /// Returns the item as read and as written.
    fn commit<F>(&self, id: StockItemId, next_quantity: F) -> StockResult<(StockItem, StockItem)>
    where
        F: Fn(&StockItem) -> StockResult<Decimal>,
    {
        let attempts = self.config.max_write_retries.max(1);
        for attempt in 1..=attempts {
            let current = self.stock_item(id)?;
            let quantity = next_quantity(&current)?;
            match self.items.update_balance(
                id,
                ExpectedVersion::Exact(current.version),
                quantity,
                self.clock.now(),
            ) {
                Ok(updated) => return Ok((current, updated)),
                Err(StoreError::Concurrency(reason)) => {
                    debug!(stock_item_id = %id, attempt, reason = %reason, "balance write lost a race; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StockError::conflict(format!(
            "stock item {id}: balance write still conflicting after {attempts} attempts"
        )))
    }

    fn append_or_compensate(
        &self,
        cmd: &PostTransaction,
        item: &StockItem,
        delta: Decimal,
        name: &str,
    ) -> StockResult<StockTransaction> {
        let entry = StockTransaction::record(cmd, name, item.unit.clone(), self.clock.now());
        match self.ledger.append(entry) {
            Ok(tx) => {
                info!(
                    transaction_id = %tx.id,
                    stock_item_id = %tx.stock_item_id,
                    transaction_type = %tx.transaction_type,
                    quantity = %tx.quantity,
                    balance = %item.current_quantity,
                    "stock transaction posted"
                );
                Ok(tx)
            }
            Err(append_err) => {
                error!(stock_item_id = %item.id, error = %append_err, "ledger append failed; reverting balance");
                if let Err(revert_err) = self.commit(item.id, |current| {
                    current.current_quantity.checked_sub(delta).ok_or_else(|| {
                        StockError::InvariantViolation(format!("stock item {}: revert overflows", current.id))
                    })
                }) {
                    error!(
                        stock_item_id = %item.id,
                        delta = %delta,
                        error = %revert_err,
                        "balance revert failed; cached balance no longer matches ledger"
                    );
                    return Err(StockError::InvariantViolation(format!(
                        "stock item {}: ledger append failed ({append_err}) and reverting {delta} failed ({revert_err})",
                        item.id
                    )));
                }
                Err(append_err.into())
            }
        }
    }
}
