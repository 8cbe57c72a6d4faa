//! Integration tests across the stores and services.
//!
//! Flow: post (ledger + balance) → snapshot seeding → reconstruction, and
//! audit open → count → complete → apply → reconstruction.
//!
//! Verifies:
//! - Backward, hybrid and snapshot reconstructions agree on complete ledgers
//! - Fallbacks (missing snapshot, degraded catalog) never fail the query
//! - Audit re-application keeps balances stable and is reported

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use stockledger_core::{CompanyId, FixedClock, StockItemId, UserId, WarehouseId};
    use stockledger_inventory::{
        CalculationMethod, CatalogKey, ItemType, LedgerWindow, PostTransaction, RegisterStockItem,
        StockItem, StockSnapshot, StockTransaction, TransactionReference, TransactionType,
        start_of_day,
    };

    use crate::audit_service::AuditReconciliation;
    use crate::catalog::{BulkWithFallback, CatalogEntry, CatalogError, InMemoryItemCatalog, ItemCatalog};
    use crate::config::StockConfig;
    use crate::error::StockError;
    use crate::ledger_service::StockLedger;
    use crate::reconstruction::{BalanceQuery, ReconstructionEngine};
    use crate::stock_store::{
        AuditStore, InMemoryAuditStore, InMemorySnapshotStore, InMemoryStockItemStore,
        InMemoryTransactionLedger, ItemFilter, SnapshotStore, StockItemStore, StoreError,
        TransactionLedger,
    };

    type Items = Arc<InMemoryStockItemStore>;
    type Ledger = Arc<InMemoryTransactionLedger>;
    type Snapshots = Arc<InMemorySnapshotStore>;
    type Resolver = Arc<BulkWithFallback<Arc<dyn ItemCatalog>>>;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn day(offset: i64) -> NaiveDate {
        today() + Duration::days(offset)
    }

    fn at(offset: i64, hour: u32) -> DateTime<Utc> {
        start_of_day(day(offset)) + Duration::hours(i64::from(hour))
    }

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    struct Harness {
        company: CompanyId,
        warehouse: WarehouseId,
        clock: Arc<FixedClock>,
        items: Items,
        ledger: Ledger,
        snapshots: Snapshots,
        audit_store: Arc<InMemoryAuditStore>,
        catalog: Arc<InMemoryItemCatalog>,
        stock: Arc<StockLedger<Items, Ledger, Resolver>>,
        engine: ReconstructionEngine<Items, Ledger, Snapshots, Resolver>,
        audits: AuditReconciliation<Arc<InMemoryAuditStore>, Items, Ledger, Resolver>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(StockConfig::default(), None)
        }

        fn with(config: StockConfig, catalog_override: Option<Arc<dyn ItemCatalog>>) -> Self {
            let clock = Arc::new(FixedClock::new(at(0, 12)));
            let items: Items = Arc::new(InMemoryStockItemStore::new());
            let ledger: Ledger = Arc::new(InMemoryTransactionLedger::new());
            let snapshots: Snapshots = Arc::new(InMemorySnapshotStore::new());
            let audit_store = Arc::new(InMemoryAuditStore::new());
            let catalog = Arc::new(InMemoryItemCatalog::new());
            let lookup: Arc<dyn ItemCatalog> = match catalog_override {
                Some(lookup) => lookup,
                None => catalog.clone(),
            };
            let resolver: Resolver = Arc::new(BulkWithFallback::new(lookup));

            let stock = Arc::new(
                StockLedger::new(items.clone(), ledger.clone(), resolver.clone(), clock.clone())
                    .with_config(config),
            );
            let engine = ReconstructionEngine::new(
                items.clone(),
                ledger.clone(),
                snapshots.clone(),
                resolver,
                clock.clone(),
            )
            .with_config(config);
            let audits = AuditReconciliation::new(audit_store.clone(), stock.clone());

            Self {
                company: CompanyId::new(),
                warehouse: WarehouseId::new(),
                clock,
                items,
                ledger,
                snapshots,
                audit_store,
                catalog,
                stock,
                engine,
                audits,
            }
        }

        fn track(&self, name: &str) -> StockItem {
            let key = CatalogKey::new(ItemType::Ingredient, Uuid::now_v7());
            self.catalog
                .upsert(key, CatalogEntry::new(name, "kg").with_code(name.to_uppercase()))
                .unwrap();
            self.stock
                .register(&RegisterStockItem {
                    company_id: self.company,
                    key,
                    warehouse_id: self.warehouse,
                    unit: "kg".to_string(),
                })
                .unwrap()
        }

        /// Post with the clock moved to `when`, then restore "now".
        fn post_at(
            &self,
            item: StockItemId,
            transaction_type: TransactionType,
            quantity: Decimal,
            when: DateTime<Utc>,
        ) -> StockTransaction {
            self.clock.set(when);
            let tx = self
                .stock
                .post(&PostTransaction {
                    stock_item_id: item,
                    transaction_type,
                    quantity,
                    actor_id: UserId::new(),
                    notes: None,
                    reference: None,
                })
                .unwrap();
            self.clock.set(at(0, 12));
            tx
        }

        fn snapshot(&self, item: StockItemId, date: NaiveDate, quantity: Decimal) {
            self.snapshots
                .record(StockSnapshot::new(self.company, item, date, quantity))
                .unwrap();
        }

        fn balance(&self, target: NaiveDate) -> crate::reconstruction::BalanceReport {
            self.engine
                .get_balance(&BalanceQuery::new(self.company, target))
                .unwrap()
        }

        fn current(&self, item: StockItemId) -> Decimal {
            self.stock.stock_item(item).unwrap().current_quantity
        }
    }

    #[test]
    fn recent_target_undoes_later_outgoing() {
        let h = Harness::new();
        let flour = h.track("flour");
        h.post_at(flour.id, TransactionType::Incoming, dec(55), at(-10, 8));
        h.post_at(flour.id, TransactionType::Outgoing, dec(5), at(-1, 15));
        assert_eq!(h.current(flour.id), dec(50));

        let report = h.balance(day(-5));
        assert_eq!(report.calculation_method, CalculationMethod::Realtime);
        assert_eq!(report.snapshot_date_used, None);
        let line = report.line(flour.id).unwrap();
        assert_eq!(line.quantity, dec(55));
        assert_eq!(line.item_name, "flour");
        assert_eq!(line.details.code.as_deref(), Some("FLOUR"));
        assert_eq!(line.details.transactions_replayed, 1);
    }

    #[test]
    fn old_target_replays_forward_from_snapshot() {
        let h = Harness::new();
        let sugar = h.track("sugar");
        h.post_at(sugar.id, TransactionType::Incoming, dec(40), at(-35, 9));
        h.snapshot(sugar.id, day(-30), dec(40));
        h.post_at(sugar.id, TransactionType::Incoming, dec(10), at(-25, 9));

        let hybrid = h.balance(day(-20));
        assert_eq!(hybrid.calculation_method, CalculationMethod::Hybrid);
        assert_eq!(hybrid.snapshot_date_used, Some(day(-30)));
        assert_eq!(hybrid.line(sugar.id).unwrap().quantity, dec(50));

        let exact = h.balance(day(-30));
        assert_eq!(exact.calculation_method, CalculationMethod::Snapshot);
        assert_eq!(exact.line(sugar.id).unwrap().quantity, dec(40));
    }

    #[test]
    fn snapshot_value_ignores_later_activity() {
        let h = Harness::new();
        let salt = h.track("salt");
        h.snapshot(salt.id, day(-30), dec(12));
        h.post_at(salt.id, TransactionType::Outgoing, dec(30), at(-30, 23));
        h.post_at(salt.id, TransactionType::Disposal, dec(5), at(-2, 10));

        let report = h.balance(day(-30));
        let line = report.line(salt.id).unwrap();
        assert_eq!(line.details.method, CalculationMethod::Snapshot);
        assert_eq!(line.quantity, dec(12));
        assert_eq!(line.details.transactions_replayed, 0);
    }

    #[test]
    fn reconstruction_just_before_an_adjustment() {
        let h = Harness::new();
        let oil = h.track("oil");
        h.post_at(oil.id, TransactionType::Incoming, dec(10), at(-3, 9));
        h.post_at(oil.id, TransactionType::Outgoing, dec(3), at(-3, 10));
        h.post_at(oil.id, TransactionType::Adjustment, dec(2), at(-1, 10));

        assert_eq!(h.current(oil.id), dec(9));
        assert_eq!(h.balance(day(-2)).line(oil.id).unwrap().quantity, dec(7));
        assert_eq!(h.balance(day(-1)).line(oil.id).unwrap().quantity, dec(9));
        assert_eq!(h.balance(today()).line(oil.id).unwrap().quantity, dec(9));
        assert!(h.stock.verify_item(oil.id).unwrap().is_consistent());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let h = Harness::new();
        let a = h.track("a");
        let b = h.track("b");
        h.post_at(a.id, TransactionType::Incoming, dec(8), at(-40, 9));
        h.post_at(b.id, TransactionType::Incoming, dec(3), at(-12, 9));
        h.snapshot(a.id, day(-20), dec(8));

        for target in [day(-1), day(-15), day(-20), day(-45)] {
            assert_eq!(h.balance(target), h.balance(target));
        }
    }

    #[test]
    fn future_target_is_rejected() {
        let h = Harness::new();
        h.track("yeast");
        let err = h
            .engine
            .get_balance(&BalanceQuery::new(h.company, day(1)))
            .unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
    }

    #[test]
    fn target_before_earliest_snapshot_falls_back_to_backward_replay() {
        let h = Harness::new();
        let rice = h.track("rice");
        h.post_at(rice.id, TransactionType::Incoming, dec(5), at(-30, 9));
        h.post_at(rice.id, TransactionType::Incoming, dec(3), at(-15, 9));
        h.snapshot(rice.id, day(-10), dec(8));

        let report = h.balance(day(-20));
        assert_eq!(report.calculation_method, CalculationMethod::Realtime);
        assert_eq!(report.snapshot_date_used, None);
        assert_eq!(report.line(rice.id).unwrap().quantity, dec(5));
        assert_eq!(
            h.snapshots.earliest_snapshot_date(h.company).unwrap(),
            Some(day(-10))
        );
    }

    #[test]
    fn mixed_snapshot_coverage_reports_hybrid() {
        let h = Harness::new();
        let covered = h.track("covered");
        let uncovered = h.track("uncovered");
        h.post_at(covered.id, TransactionType::Incoming, dec(4), at(-40, 9));
        h.post_at(uncovered.id, TransactionType::Incoming, dec(6), at(-40, 9));
        h.snapshot(covered.id, day(-20), dec(4));

        let report = h.balance(day(-20));
        assert_eq!(report.calculation_method, CalculationMethod::Hybrid);
        assert_eq!(
            report.line(covered.id).unwrap().details.method,
            CalculationMethod::Snapshot
        );
        assert_eq!(
            report.line(uncovered.id).unwrap().details.method,
            CalculationMethod::Realtime
        );
        assert_eq!(report.line(uncovered.id).unwrap().quantity, dec(6));
    }

    #[test]
    fn negative_replay_is_clamped_but_raw_value_is_kept() {
        let h = Harness::new();
        let milk = h.track("milk");
        h.snapshot(milk.id, day(-20), dec(2));
        h.post_at(milk.id, TransactionType::Outgoing, dec(5), at(-15, 9));

        let line = h.balance(day(-10)).line(milk.id).cloned().unwrap();
        assert_eq!(line.details.method, CalculationMethod::Hybrid);
        assert_eq!(line.raw_quantity, dec(-3));
        assert_eq!(line.quantity, Decimal::ZERO);
    }

    #[test]
    fn filters_narrow_the_item_set_and_unknown_ids_are_not_found() {
        let h = Harness::new();
        let kept = h.track("kept");
        let other_warehouse = h
            .stock
            .register(&RegisterStockItem {
                company_id: h.company,
                key: CatalogKey::new(ItemType::Container, Uuid::now_v7()),
                warehouse_id: WarehouseId::new(),
                unit: "pcs".to_string(),
            })
            .unwrap();

        let by_warehouse = h
            .engine
            .get_balance(&BalanceQuery::new(h.company, today()).with_filter(ItemFilter {
                warehouse_id: Some(h.warehouse),
                ..ItemFilter::default()
            }))
            .unwrap();
        assert_eq!(by_warehouse.items.len(), 1);
        assert_eq!(by_warehouse.items[0].stock_item_id, kept.id);

        let by_type = h
            .engine
            .get_balance(&BalanceQuery::new(h.company, today()).with_filter(ItemFilter {
                item_type: Some(ItemType::Container),
                ..ItemFilter::default()
            }))
            .unwrap();
        assert_eq!(by_type.items[0].stock_item_id, other_warehouse.id);

        let unknown = StockItemId::new();
        let err = h
            .engine
            .get_balance(
                &BalanceQuery::new(h.company, today())
                    .with_filter(ItemFilter::single(unknown)),
            )
            .unwrap_err();
        match err {
            StockError::NotFound(msg) => assert!(msg.contains(&unknown.to_string())),
            other => panic!("expected not found, got {other:?}"),
        }

        let elsewhere = h
            .engine
            .get_balance(&BalanceQuery::new(CompanyId::new(), today()))
            .unwrap();
        assert!(elsewhere.items.is_empty());
    }

    /// Catalog whose bulk endpoint is down; single lookups still work.
    struct BulkDown {
        inner: Arc<InMemoryItemCatalog>,
    }

    impl ItemCatalog for BulkDown {
        fn lookup_many(
            &self,
            _: &[CatalogKey],
        ) -> Result<HashMap<CatalogKey, CatalogEntry>, CatalogError> {
            Err(CatalogError::Unavailable("bulk endpoint timed out".to_string()))
        }

        fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, CatalogError> {
            self.inner.lookup(key)
        }
    }

    #[test]
    fn catalog_outage_degrades_instead_of_failing() {
        let shared = Arc::new(InMemoryItemCatalog::new());
        let h = Harness::with(
            StockConfig::default(),
            Some(Arc::new(BulkDown {
                inner: shared.clone(),
            })),
        );
        let known = CatalogKey::new(ItemType::Ingredient, Uuid::now_v7());
        shared.upsert(known, CatalogEntry::new("butter", "kg")).unwrap();
        let named = h
            .stock
            .register(&RegisterStockItem {
                company_id: h.company,
                key: known,
                warehouse_id: h.warehouse,
                unit: "kg".to_string(),
            })
            .unwrap();
        let anonymous = h
            .stock
            .register(&RegisterStockItem {
                company_id: h.company,
                key: CatalogKey::new(ItemType::Ingredient, Uuid::now_v7()),
                warehouse_id: h.warehouse,
                unit: "g".to_string(),
            })
            .unwrap();

        let report = h.balance(today());
        assert!(report.catalog_degraded);
        assert_eq!(report.line(named.id).unwrap().item_name, "butter");
        let placeholder = report.line(anonymous.id).unwrap();
        assert!(placeholder.details.catalog_unresolved);
        assert_eq!(placeholder.item_name, anonymous.catalog_key().to_string());
        assert_eq!(placeholder.unit, "g");
    }

    /// Ledger wrapper counting window queries.
    struct CountingLedger {
        inner: Ledger,
        queries: AtomicUsize,
    }

    impl TransactionLedger for CountingLedger {
        fn append(&self, transaction: StockTransaction) -> Result<StockTransaction, StoreError> {
            self.inner.append(transaction)
        }

        fn list_for_items(
            &self,
            items: &[StockItemId],
            window: LedgerWindow,
        ) -> Result<Vec<StockTransaction>, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.list_for_items(items, window)
        }

        fn find_by_reference(
            &self,
            reference: &TransactionReference,
        ) -> Result<Vec<StockTransaction>, StoreError> {
            self.inner.find_by_reference(reference)
        }
    }

    #[test]
    fn ledger_is_queried_per_set_not_per_item() {
        let h = Harness::new();
        for i in 0..40 {
            let item = h.track(&format!("item-{i}"));
            h.post_at(item.id, TransactionType::Incoming, dec(i + 1), at(-50, 9));
            h.post_at(item.id, TransactionType::Outgoing, dec(1), at(-5, 9));
            if i % 2 == 0 {
                h.snapshot(item.id, day(-30), dec(i + 1));
            }
        }

        let counting = Arc::new(CountingLedger {
            inner: h.ledger.clone(),
            queries: AtomicUsize::new(0),
        });
        let engine = ReconstructionEngine::new(
            h.items.clone(),
            counting.clone(),
            h.snapshots.clone(),
            BulkWithFallback::new(h.catalog.clone()),
            h.clock.clone(),
        );

        let report = engine.get_balance(&BalanceQuery::new(h.company, day(-20))).unwrap();
        assert_eq!(report.items.len(), 40);
        assert!(counting.queries.load(Ordering::SeqCst) <= 2);
        assert_eq!(report.calculation_method, CalculationMethod::Hybrid);
    }

    /// Snapshot store that is unreachable.
    struct SnapshotsDown;

    impl SnapshotStore for SnapshotsDown {
        fn latest_on_or_before(
            &self,
            _: CompanyId,
            _: &[StockItemId],
            _: NaiveDate,
        ) -> Result<HashMap<StockItemId, StockSnapshot>, StoreError> {
            Err(StoreError::Unavailable("snapshot replica offline".to_string()))
        }

        fn earliest_snapshot_date(&self, _: CompanyId) -> Result<Option<NaiveDate>, StoreError> {
            Err(StoreError::Unavailable("snapshot replica offline".to_string()))
        }
    }

    #[test]
    fn store_failures_carry_date_and_method() {
        let h = Harness::new();
        h.track("cocoa");
        let engine = ReconstructionEngine::new(
            h.items.clone(),
            h.ledger.clone(),
            SnapshotsDown,
            BulkWithFallback::new(h.catalog.clone()),
            h.clock.clone(),
        );

        let err = engine
            .get_balance(&BalanceQuery::new(h.company, day(-20)))
            .unwrap_err();
        match &err {
            StockError::Reconstruction {
                target_date,
                method,
                source,
            } => {
                assert_eq!(*target_date, day(-20));
                assert_eq!(*method, CalculationMethod::Hybrid);
                assert!(matches!(**source, StockError::Store(StoreError::Unavailable(_))));
            }
            other => panic!("expected reconstruction error, got {other:?}"),
        }

        // Recent targets never touch snapshots.
        assert!(engine.get_balance(&BalanceQuery::new(h.company, day(-2))).is_ok());
    }

    /// No snapshot ever taken; the earliest-date lookup is counted and fails.
    struct NoSnapshots {
        earliest_calls: AtomicUsize,
    }

    impl SnapshotStore for NoSnapshots {
        fn latest_on_or_before(
            &self,
            _: CompanyId,
            _: &[StockItemId],
            _: NaiveDate,
        ) -> Result<HashMap<StockItemId, StockSnapshot>, StoreError> {
            Ok(HashMap::new())
        }

        fn earliest_snapshot_date(&self, _: CompanyId) -> Result<Option<NaiveDate>, StoreError> {
            self.earliest_calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("snapshot index offline".to_string()))
        }
    }

    #[test]
    fn fallback_does_not_depend_on_the_earliest_snapshot_lookup() {
        let h = Harness::new();
        let salt = h.track("salt");
        h.post_at(salt.id, TransactionType::Incoming, dec(5), at(-40, 9));

        let snapshots = Arc::new(NoSnapshots {
            earliest_calls: AtomicUsize::new(0),
        });
        let engine = ReconstructionEngine::new(
            h.items.clone(),
            h.ledger.clone(),
            snapshots.clone(),
            BulkWithFallback::new(h.catalog.clone()),
            h.clock.clone(),
        );
        let query = BalanceQuery::new(h.company, day(-20));

        let quiet = tracing::subscriber::with_default(tracing::subscriber::NoSubscriber::default(), || {
            engine.get_balance(&query)
        })
        .unwrap();
        assert_eq!(quiet.calculation_method, CalculationMethod::Realtime);
        assert_eq!(quiet.line(salt.id).unwrap().quantity, dec(5));
        assert_eq!(snapshots.earliest_calls.load(Ordering::SeqCst), 0);

        // Even when the log line wants it, a failed lookup leaves the read intact.
        let report = engine.get_balance(&query).unwrap();
        assert_eq!(report.line(salt.id).unwrap().quantity, dec(5));
    }

    #[test]
    fn audit_overwrites_balance_and_is_replayable() {
        let h = Harness::new();
        let flour = h.track("flour");
        h.post_at(flour.id, TransactionType::Incoming, dec(10), at(-4, 9));

        let audit = h.audits.open_audit(h.company, h.warehouse).unwrap();
        let line = h.audits.add_item(audit.id, flour.id).unwrap();
        assert_eq!(line.expected_quantity, dec(10));

        let counted = h.audits.record_count(audit.id, line.id, dec(7)).unwrap();
        assert_eq!(counted.difference, Some(dec(-3)));

        h.audits.complete_audit(audit.id).unwrap();
        h.clock.set(at(-1, 18));
        let report = h.audits.apply_differences(audit.id, UserId::new()).unwrap();
        h.clock.set(at(0, 12));

        assert!(report.is_success());
        assert_eq!(report.updated_count, 1);
        assert!(report.errors.is_empty());
        assert!(report.reapplied_items.is_empty());
        assert_eq!(h.current(flour.id), dec(7));

        let adjustments = h
            .ledger
            .find_by_reference(&TransactionReference::audit(audit.id))
            .unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].transaction_type, TransactionType::Adjustment);
        assert_eq!(adjustments[0].quantity, dec(-3));

        assert_eq!(h.balance(day(-2)).line(flour.id).unwrap().quantity, dec(10));
        assert_eq!(h.balance(day(-1)).line(flour.id).unwrap().quantity, dec(7));
        assert!(h.stock.verify_item(flour.id).unwrap().is_consistent());
    }

    #[test]
    fn reapplying_an_audit_keeps_balance_and_flags_duplicate_adjustment() {
        let h = Harness::new();
        let sugar = h.track("sugar");
        h.post_at(sugar.id, TransactionType::Incoming, dec(20), at(-2, 9));

        let audit = h.audits.open_audit(h.company, h.warehouse).unwrap();
        let line = h.audits.add_item(audit.id, sugar.id).unwrap();
        h.audits.record_count(audit.id, line.id, dec(18)).unwrap();
        h.audits.complete_audit(audit.id).unwrap();

        let first = h.audits.apply_differences(audit.id, UserId::new()).unwrap();
        assert!(first.reapplied_items.is_empty());
        assert_eq!(h.current(sugar.id), dec(18));

        h.clock.advance(Duration::hours(1));
        let second = h.audits.apply_differences(audit.id, UserId::new()).unwrap();
        assert_eq!(second.updated_count, 1);
        assert_eq!(second.reapplied_items, vec![sugar.id]);
        assert_eq!(h.current(sugar.id), dec(18));

        // The duplicate entry is written, not suppressed; it carries no delta.
        let adjustments = h
            .ledger
            .find_by_reference(&TransactionReference::audit(audit.id))
            .unwrap();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].quantity, dec(-2));
        assert_eq!(adjustments[1].quantity, Decimal::ZERO);
        assert!(h.stock.verify_item(sugar.id).unwrap().is_consistent());
    }

    #[test]
    fn warehouse_mismatch_fails_only_that_item() {
        let h = Harness::new();
        let here = h.track("here");
        let moved = h
            .stock
            .register(&RegisterStockItem {
                company_id: h.company,
                key: CatalogKey::new(ItemType::Ingredient, Uuid::now_v7()),
                warehouse_id: WarehouseId::new(),
                unit: "kg".to_string(),
            })
            .unwrap();
        h.post_at(here.id, TransactionType::Incoming, dec(5), at(-1, 9));
        h.post_at(moved.id, TransactionType::Incoming, dec(5), at(-1, 9));

        let audit = h.audits.open_audit(h.company, h.warehouse).unwrap();
        let line = h.audits.add_item(audit.id, here.id).unwrap();
        h.audits.record_count(audit.id, line.id, dec(4)).unwrap();
        // A line whose item lives elsewhere, as left behind by a stale reference.
        let stale = stockledger_inventory::StockAuditItem::new(audit.id, moved.id, dec(5))
            .record_count(dec(1))
            .unwrap();
        h.audit_store.upsert_item(stale.clone()).unwrap();
        h.audits.complete_audit(audit.id).unwrap();

        let report = h.audits.apply_differences(audit.id, UserId::new()).unwrap();
        assert!(report.is_success());
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].audit_item_id, stale.id);
        assert!(report.errors[0].message.contains("warehouse"));
        assert_eq!(h.current(here.id), dec(4));
        assert_eq!(h.current(moved.id), dec(5));
    }

    #[test]
    fn items_listing_matches_registry() {
        let h = Harness::new();
        h.track("a");
        h.track("b");
        assert_eq!(h.items.list(h.company, &ItemFilter::all()).unwrap().len(), 2);
    }

    #[test]
    fn report_serializes_methods_in_lowercase() {
        let h = Harness::new();
        h.track("tea");
        let json = serde_json::to_value(h.balance(today())).unwrap();
        assert_eq!(json["calculation_method"], "realtime");
        assert_eq!(json["items"][0]["details"]["method"], "realtime");
    }

    #[derive(Debug, Clone)]
    struct Entry {
        day: i64,
        hour: u32,
        transaction_type: TransactionType,
        quantity: Decimal,
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        (
            -60i64..=-1,
            0u32..24,
            prop_oneof![
                Just(TransactionType::Incoming),
                Just(TransactionType::Outgoing),
                Just(TransactionType::Disposal),
                Just(TransactionType::Adjustment),
            ],
            0i64..10_000,
        )
            .prop_map(|(day, hour, transaction_type, q)| Entry {
                day,
                hour,
                transaction_type,
                quantity: match transaction_type {
                    TransactionType::Adjustment => Decimal::new(q - 5_000, 1),
                    _ => Decimal::new(q, 1),
                },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 48, ..ProptestConfig::default() })]

        #[test]
        fn hybrid_and_backward_reconstruction_agree(
            entries in prop::collection::vec(arb_entry(), 0..30),
            snapshot_day in -60i64..=-8,
            target_gap in 0i64..=52,
        ) {
            let target_day = (snapshot_day + target_gap).min(-8);

            let h = Harness::new();
            let item = h.track("prop");
            for e in &entries {
                h.post_at(item.id, e.transaction_type, e.quantity, at(e.day, e.hour));
            }

            // True balance at end of the snapshot day, as a snapshot job would record it.
            let cutoff = start_of_day(day(snapshot_day + 1));
            let at_snapshot: Decimal = h
                .stock
                .history(item.id)
                .unwrap()
                .iter()
                .filter(|tx| tx.timestamp < cutoff)
                .map(StockTransaction::signed_effect)
                .sum();
            h.snapshot(item.id, day(snapshot_day), at_snapshot);

            let backward = ReconstructionEngine::new(
                h.items.clone(),
                h.ledger.clone(),
                h.snapshots.clone(),
                BulkWithFallback::new(h.catalog.clone()),
                h.clock.clone(),
            )
            .with_config(StockConfig::default().with_recent_window_days(365));

            let query = BalanceQuery::new(h.company, day(target_day));
            let from_snapshot = h.engine.get_balance(&query).unwrap();
            let from_now = backward.get_balance(&query).unwrap();

            let expected_method = if target_day == snapshot_day {
                CalculationMethod::Snapshot
            } else {
                CalculationMethod::Hybrid
            };
            prop_assert_eq!(from_snapshot.calculation_method, expected_method);
            prop_assert_eq!(from_now.calculation_method, CalculationMethod::Realtime);
            prop_assert_eq!(
                from_snapshot.items[0].raw_quantity,
                from_now.items[0].raw_quantity
            );
        }
    }
}
