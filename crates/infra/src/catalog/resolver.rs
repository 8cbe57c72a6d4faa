use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use stockledger_inventory::CatalogKey;

use super::{CatalogEntry, CatalogError, ItemCatalog};

/// Outcome of resolving catalog details for a set of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDetails {
    pub entries: HashMap<CatalogKey, CatalogEntry>,
    /// Keys the catalog answered for but does not know.
    pub missing: BTreeSet<CatalogKey>,
    /// Keys whose lookup failed outright.
    pub failures: BTreeSet<CatalogKey>,
    /// The bulk lookup failed, or a per-key lookup found or failed what it dropped.
    pub degraded: bool,
    pub fallback_lookups: usize,
}

impl ResolvedDetails {
    pub fn get(&self, key: &CatalogKey) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failures.is_empty()
    }
}

/// Resolves display details for stock items. Never fails the caller.
pub trait ItemDetailsResolver: Send + Sync {
    fn resolve(&self, keys: &[CatalogKey]) -> ResolvedDetails;
}

impl<R> ItemDetailsResolver for std::sync::Arc<R>
where
    R: ItemDetailsResolver + ?Sized,
{
    fn resolve(&self, keys: &[CatalogKey]) -> ResolvedDetails {
        (**self).resolve(keys)
    }
}

/// One bulk lookup, then per-key lookups only for what the bulk call missed.
#[derive(Debug, Clone)]
pub struct BulkWithFallback<C> {
    catalog: C,
}

impl<C> BulkWithFallback<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }
}

impl<C: ItemCatalog> ItemDetailsResolver for BulkWithFallback<C> {
    fn resolve(&self, keys: &[CatalogKey]) -> ResolvedDetails {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut out = ResolvedDetails::default();
        if keys.is_empty() {
            return out;
        }

        match self.catalog.lookup_many(&keys) {
            Ok(found) => out.entries = found,
            Err(err) => {
                warn!(error = %err, keys = keys.len(), "bulk catalog lookup failed; falling back to per-item lookups");
                out.degraded = true;
            }
        }

        let pending: Vec<CatalogKey> = keys
            .into_iter()
            .filter(|key| !out.entries.contains_key(key))
            .collect();
        if pending.is_empty() {
            return out;
        }
        let bulk_failed = out.degraded;
        let mut recovered = 0usize;
        for key in pending {
            out.fallback_lookups += 1;
            match self.catalog.lookup(&key) {
                Ok(Some(entry)) => {
                    recovered += 1;
                    out.entries.insert(key, entry);
                }
                Ok(None) => {
                    out.missing.insert(key);
                }
                Err(CatalogError::Unavailable(reason)) => {
                    warn!(catalog_key = %key, reason = %reason, "catalog lookup failed");
                    out.failures.insert(key);
                }
            }
        }

        // Keys the catalog does not know are an answer, not a partial bulk result.
        if !bulk_failed && (recovered > 0 || !out.failures.is_empty()) {
            warn!(
                recovered,
                failed = out.failures.len(),
                "bulk catalog lookup was partial"
            );
            out.degraded = true;
        } else if !out.missing.is_empty() {
            debug!(missing = out.missing.len(), "catalog does not know some stock items");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use stockledger_inventory::ItemType;
    use uuid::Uuid;

    use crate::catalog::InMemoryItemCatalog;

    /// Catalog whose bulk call drops keys or fails, counting every call.
    struct FlakyCatalog {
        inner: InMemoryItemCatalog,
        bulk_fails: bool,
        bulk_drops: Vec<CatalogKey>,
        single_fails: Vec<CatalogKey>,
        bulk_calls: AtomicUsize,
        single_calls: AtomicUsize,
    }

    impl FlakyCatalog {
        fn new(inner: InMemoryItemCatalog) -> Self {
            Self {
                inner,
                bulk_fails: false,
                bulk_drops: vec![],
                single_fails: vec![],
                bulk_calls: AtomicUsize::new(0),
                single_calls: AtomicUsize::new(0),
            }
        }
    }

    impl ItemCatalog for FlakyCatalog {
        fn lookup_many(
            &self,
            keys: &[CatalogKey],
        ) -> Result<HashMap<CatalogKey, CatalogEntry>, CatalogError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if self.bulk_fails {
                return Err(CatalogError::Unavailable("timeout".to_string()));
            }
            let mut found = self.inner.lookup_many(keys)?;
            for key in &self.bulk_drops {
                found.remove(key);
            }
            Ok(found)
        }

        fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, CatalogError> {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if self.single_fails.contains(key) {
                return Err(CatalogError::Unavailable("timeout".to_string()));
            }
            self.inner.lookup(key)
        }
    }

    fn key() -> CatalogKey {
        CatalogKey::new(ItemType::Ingredient, Uuid::now_v7())
    }

    fn seeded(keys: &[CatalogKey]) -> InMemoryItemCatalog {
        let catalog = InMemoryItemCatalog::new();
        for (i, k) in keys.iter().enumerate() {
            catalog
                .upsert(*k, CatalogEntry::new(format!("Item {i}"), "kg"))
                .unwrap();
        }
        catalog
    }

    #[test]
    fn complete_bulk_lookup_needs_no_fallback() {
        let keys = [key(), key(), key()];
        let resolver = BulkWithFallback::new(FlakyCatalog::new(seeded(&keys)));

        let resolved = resolver.resolve(&keys);
        assert!(resolved.is_complete());
        assert!(!resolved.degraded);
        assert_eq!(resolved.entries.len(), 3);
        assert_eq!(resolver.catalog().bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.catalog().single_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn partial_bulk_lookup_falls_back_for_the_missing_subset_only() {
        let keys = [key(), key(), key()];
        let mut catalog = FlakyCatalog::new(seeded(&keys));
        catalog.bulk_drops = vec![keys[1]];
        let resolver = BulkWithFallback::new(catalog);

        let resolved = resolver.resolve(&keys);
        assert!(resolved.degraded);
        assert!(resolved.is_complete());
        assert_eq!(resolved.fallback_lookups, 1);
        assert_eq!(resolver.catalog().single_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_bulk_lookup_degrades_per_item() {
        let keys = [key(), key(), key()];
        let unknown = key();
        let mut catalog = FlakyCatalog::new(seeded(&keys));
        catalog.bulk_fails = true;
        catalog.single_fails = vec![keys[2]];
        let resolver = BulkWithFallback::new(catalog);

        let resolved = resolver.resolve(&[keys[0], keys[1], keys[2], unknown, keys[0]]);
        assert!(resolved.degraded);
        assert_eq!(resolved.fallback_lookups, 4);
        assert_eq!(resolved.entries.len(), 2);
        assert!(resolved.failures.contains(&keys[2]));
        assert!(resolved.missing.contains(&unknown));
    }

    #[test]
    fn unknown_items_do_not_degrade_a_healthy_bulk_lookup() {
        let keys = [key(), key()];
        let unknown = key();
        let resolver = BulkWithFallback::new(FlakyCatalog::new(seeded(&keys)));

        let resolved = resolver.resolve(&[keys[0], unknown, keys[1]]);
        assert!(!resolved.degraded);
        assert_eq!(resolved.entries.len(), 2);
        assert!(resolved.missing.contains(&unknown));
        assert!(resolved.failures.is_empty());
        assert_eq!(resolved.fallback_lookups, 1);
    }

    #[test]
    fn failed_fallback_after_partial_bulk_lookup_degrades() {
        let keys = [key(), key()];
        let mut catalog = FlakyCatalog::new(seeded(&keys));
        catalog.bulk_drops = vec![keys[1]];
        catalog.single_fails = vec![keys[1]];
        let resolver = BulkWithFallback::new(catalog);

        let resolved = resolver.resolve(&keys);
        assert!(resolved.degraded);
        assert!(resolved.failures.contains(&keys[1]));
        assert_eq!(resolved.entries.len(), 1);
    }

    #[test]
    fn empty_request_touches_nothing() {
        let resolver = BulkWithFallback::new(FlakyCatalog::new(InMemoryItemCatalog::new()));
        let resolved = resolver.resolve(&[]);
        assert_eq!(resolved, ResolvedDetails::default());
        assert_eq!(resolver.catalog().bulk_calls.load(Ordering::SeqCst), 0);
    }
}
