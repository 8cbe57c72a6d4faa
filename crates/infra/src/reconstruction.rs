//! Point-in-time balance reconstruction.
//!
//! Recent targets replay backward from the live balance; older targets start
//! from the latest snapshot on or before the target and replay forward. Items
//! with no usable snapshot fall back to backward replay. All lookups are
//! set-based: one item listing, one snapshot query, at most two ledger
//! queries and one catalog resolution per call, whatever the item count.
//!
//! The engine never writes. Calls with no intervening writes return the same
//! report.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, info, warn};

use stockledger_core::{Clock, CompanyId, StockItemId, WarehouseId};
use stockledger_inventory::{
    CalculationMethod, ItemType, LedgerWindow, ReplayStrategy, Replayed, StockItem, StockSnapshot,
    StockTransaction, replay_backward, replay_forward, select_strategy,
};

use crate::catalog::{ItemDetailsResolver, ResolvedDetails};
use crate::config::StockConfig;
use crate::error::{StockError, StockResult};
use crate::stock_store::{ItemFilter, SnapshotStore, StockItemStore, TransactionLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub company_id: CompanyId,
    /// Balance is reported as of the end of this day (UTC).
    pub target_date: NaiveDate,
    #[serde(default)]
    pub filter: ItemFilter,
}

impl BalanceQuery {
    pub fn new(company_id: CompanyId, target_date: NaiveDate) -> Self {
        Self {
            company_id,
            target_date,
            filter: ItemFilter::all(),
        }
    }

    pub fn with_filter(mut self, filter: ItemFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDetails {
    pub item_type: ItemType,
    pub item_id: uuid::Uuid,
    pub warehouse_id: WarehouseId,
    pub code: Option<String>,
    pub category: Option<String>,
    pub method: CalculationMethod,
    pub transactions_replayed: usize,
    pub snapshot_date: Option<NaiveDate>,
    /// Catalog details could not be resolved; name and unit are placeholders.
    pub catalog_unresolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub stock_item_id: StockItemId,
    pub item_name: String,
    pub unit: String,
    /// Display value: replayed results are floored at zero.
    pub quantity: Decimal,
    pub raw_quantity: Decimal,
    pub details: BalanceDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub company_id: CompanyId,
    pub target_date: NaiveDate,
    pub items: Vec<BalanceLine>,
    pub calculation_method: CalculationMethod,
    pub snapshot_date_used: Option<NaiveDate>,
    /// Bulk catalog lookup failed or was partial for this report.
    pub catalog_degraded: bool,
}

impl BalanceReport {
    pub fn line(&self, id: StockItemId) -> Option<&BalanceLine> {
        self.items.iter().find(|line| line.stock_item_id == id)
    }
}

/// Which replay each item goes through, decided before touching the ledger.
struct ReplayPlan {
    backward: Vec<StockItem>,
    forward: Vec<(StockItem, StockSnapshot)>,
}

pub struct ReconstructionEngine<I, L, S, R> {
    items: I,
    ledger: L,
    snapshots: S,
    resolver: R,
    clock: Arc<dyn Clock>,
    config: StockConfig,
}

impl<I, L, S, R> ReconstructionEngine<I, L, S, R>
where
    I: StockItemStore,
    L: TransactionLedger,
    S: SnapshotStore,
    R: ItemDetailsResolver,
{
    pub fn new(items: I, ledger: L, snapshots: S, resolver: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            items,
            ledger,
            snapshots,
            resolver,
            clock,
            config: StockConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    /// Balances at end of `query.target_date`.
    ///
    /// Fails with `Validation` for future dates and `NotFound` for explicitly
    /// requested items the company does not track. Other failures are wrapped
    /// with the target date and the method attempted.
    pub fn get_balance(&self, query: &BalanceQuery) -> StockResult<BalanceReport> {
        let today = self.clock.now().date_naive();
        let strategy = select_strategy(today, query.target_date, self.config.recent_window_days)?;
        debug!(
            company_id = %query.company_id,
            target_date = %query.target_date,
            ?strategy,
            "reconstructing balances"
        );

        let attempted = match strategy {
            ReplayStrategy::Backward => CalculationMethod::Realtime,
            ReplayStrategy::FromSnapshot => CalculationMethod::Hybrid,
        };
        self.reconstruct(query, strategy).map_err(|err| match err {
            StockError::Validation(_) | StockError::NotFound(_) => err,
            other => other.in_reconstruction(query.target_date, attempted),
        })
    }

    fn reconstruct(&self, query: &BalanceQuery, strategy: ReplayStrategy) -> StockResult<BalanceReport> {
        let target = query.target_date;
        let items = self.load_items(query)?;
        let plan = self.plan(query.company_id, target, strategy, items)?;

        let backward_ids: Vec<StockItemId> = plan.backward.iter().map(|item| item.id).collect();
        let mut by_item = self.fetch_ledger(&backward_ids, LedgerWindow::after_day(target))?;

        let forward_window = plan
            .forward
            .iter()
            .filter(|(_, snap)| snap.snapshot_date < target)
            .map(|(_, snap)| LedgerWindow::between_days(snap.snapshot_date, target))
            .reduce(|a, b| a.union(&b));
        if let Some(window) = forward_window {
            let forward_ids: Vec<StockItemId> = plan
                .forward
                .iter()
                .filter(|(_, snap)| snap.snapshot_date < target)
                .map(|(item, _)| item.id)
                .collect();
            by_item.extend(self.fetch_ledger(&forward_ids, window)?);
        }

        let empty = Vec::new();
        let mut replayed: Vec<(StockItem, Replayed)> =
            Vec::with_capacity(plan.backward.len() + plan.forward.len());
        for item in plan.backward {
            let entries = by_item.get(&item.id).unwrap_or(&empty);
            let result = replay_backward(item.current_quantity, target, entries)?;
            replayed.push((item, result));
        }
        for (item, snapshot) in plan.forward {
            let entries = by_item.get(&item.id).unwrap_or(&empty);
            let result = replay_forward(&snapshot, target, entries)?;
            replayed.push((item, result));
        }
        replayed.sort_by_key(|(item, _)| item.id);

        let keys: Vec<_> = replayed.iter().map(|(item, _)| item.catalog_key()).collect();
        let details = self.resolver.resolve(&keys);

        let items: Vec<BalanceLine> = replayed
            .into_iter()
            .map(|(item, result)| self.line(target, item, result, &details))
            .collect();

        let calculation_method = overall_method(strategy, &items);
        let snapshot_date_used = items.iter().filter_map(|l| l.details.snapshot_date).max();

        info!(
            company_id = %query.company_id,
            target_date = %target,
            method = %calculation_method,
            items = items.len(),
            snapshot_date_used = ?snapshot_date_used,
            "balances reconstructed"
        );

        Ok(BalanceReport {
            company_id: query.company_id,
            target_date: target,
            items,
            calculation_method,
            snapshot_date_used,
            catalog_degraded: details.degraded,
        })
    }

    fn load_items(&self, query: &BalanceQuery) -> StockResult<Vec<StockItem>> {
        let items = self.items.list(query.company_id, &query.filter)?;
        if let Some(requested) = &query.filter.stock_item_ids {
            let missing: Vec<String> = requested
                .iter()
                .filter(|id| !items.iter().any(|item| item.id == **id))
                .map(ToString::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(StockError::not_found(format!(
                    "stock items [{}] for company {} as of {}",
                    missing.join(", "),
                    query.company_id,
                    query.target_date
                )));
            }
        }
        Ok(items)
    }

    fn plan(
        &self,
        company_id: CompanyId,
        target: NaiveDate,
        strategy: ReplayStrategy,
        items: Vec<StockItem>,
    ) -> StockResult<ReplayPlan> {
        if strategy == ReplayStrategy::Backward || items.is_empty() {
            return Ok(ReplayPlan {
                backward: items,
                forward: vec![],
            });
        }

        let ids: Vec<StockItemId> = items.iter().map(|item| item.id).collect();
        let mut snapshots = self.snapshots.latest_on_or_before(company_id, &ids, target)?;

        let mut plan = ReplayPlan {
            backward: vec![],
            forward: Vec::with_capacity(snapshots.len()),
        };
        for item in items {
            match snapshots.remove(&item.id) {
                Some(snapshot) => plan.forward.push((item, snapshot)),
                None => plan.backward.push(item),
            }
        }

        if !plan.backward.is_empty() && tracing::enabled!(Level::INFO) {
            // Context for the log line only; a failed lookup must not fail the read.
            let earliest = self
                .snapshots
                .earliest_snapshot_date(company_id)
                .ok()
                .flatten();
            info!(
                company_id = %company_id,
                target_date = %target,
                items = plan.backward.len(),
                earliest_snapshot = ?earliest,
                "no snapshot on or before target; replaying backward from current balance"
            );
        }
        Ok(plan)
    }

    fn fetch_ledger(
        &self,
        ids: &[StockItemId],
        window: LedgerWindow,
    ) -> StockResult<HashMap<StockItemId, Vec<StockTransaction>>> {
        let mut by_item: HashMap<StockItemId, Vec<StockTransaction>> = HashMap::new();
        if ids.is_empty() {
            return Ok(by_item);
        }
        for tx in self.ledger.list_for_items(ids, window)? {
            by_item.entry(tx.stock_item_id).or_default().push(tx);
        }
        Ok(by_item)
    }

    fn line(
        &self,
        target: NaiveDate,
        item: StockItem,
        result: Replayed,
        details: &ResolvedDetails,
    ) -> BalanceLine {
        let key = item.catalog_key();
        let entry = details.get(&key);

        if result.is_negative() {
            warn!(
                stock_item_id = %item.id,
                target_date = %target,
                method = %result.method,
                raw_quantity = %result.raw_quantity,
                snapshot_date = ?result.snapshot_date,
                "reconstructed balance is negative; ledger or snapshot may be incomplete"
            );
        }

        BalanceLine {
            stock_item_id: item.id,
            item_name: entry
                .map(|e| e.name.clone())
                .unwrap_or_else(|| key.to_string()),
            unit: entry.map(|e| e.unit.clone()).unwrap_or(item.unit),
            quantity: result.display_quantity(),
            raw_quantity: result.raw_quantity,
            details: BalanceDetails {
                item_type: item.item_type,
                item_id: item.item_id,
                warehouse_id: item.warehouse_id,
                code: entry.and_then(|e| e.code.clone()),
                category: entry.and_then(|e| e.category.clone()),
                method: result.method,
                transactions_replayed: result.transactions_applied,
                snapshot_date: result.snapshot_date,
                catalog_unresolved: entry.is_none(),
            },
        }
    }
}

/// Method reported for the whole response.
///
/// Backward strategy is always `realtime`. For snapshot-based queries: every
/// line served straight from a snapshot gives `snapshot`; no line touching a
/// snapshot gives `realtime`; any mix gives `hybrid`.
fn overall_method(strategy: ReplayStrategy, lines: &[BalanceLine]) -> CalculationMethod {
    if strategy == ReplayStrategy::Backward {
        return CalculationMethod::Realtime;
    }
    let used_snapshot = lines.iter().filter(|l| l.details.snapshot_date.is_some()).count();
    let exact = lines
        .iter()
        .filter(|l| l.details.method == CalculationMethod::Snapshot)
        .count();
    match used_snapshot {
        0 => CalculationMethod::Realtime,
        n if n == exact && n == lines.len() => CalculationMethod::Snapshot,
        _ => CalculationMethod::Hybrid,
    }
}
