//! Boundary to the external item catalog (names, units, codes, categories).
//!
//! The catalog is a collaborator this system does not own. Lookups can fail
//! or come back partial; callers degrade instead of failing the whole request.

pub mod resolver;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_inventory::CatalogKey;

pub use resolver::{BulkWithFallback, ItemDetailsResolver, ResolvedDetails};

/// Descriptive attributes of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub unit: String,
    pub code: Option<String>,
    pub category: Option<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            code: None,
            category: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the item catalog.
pub trait ItemCatalog: Send + Sync {
    /// Bulk lookup. Keys the catalog does not know are absent from the result.
    fn lookup_many(
        &self,
        keys: &[CatalogKey],
    ) -> Result<HashMap<CatalogKey, CatalogEntry>, CatalogError>;

    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.lookup_many(std::slice::from_ref(key))?.remove(key))
    }
}

impl<C> ItemCatalog for Arc<C>
where
    C: ItemCatalog + ?Sized,
{
    fn lookup_many(
        &self,
        keys: &[CatalogKey],
    ) -> Result<HashMap<CatalogKey, CatalogEntry>, CatalogError> {
        (**self).lookup_many(keys)
    }

    fn lookup(&self, key: &CatalogKey) -> Result<Option<CatalogEntry>, CatalogError> {
        (**self).lookup(key)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryItemCatalog {
    entries: RwLock<HashMap<CatalogKey, CatalogEntry>>,
}

impl InMemoryItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, key: CatalogKey, entry: CatalogEntry) -> Result<(), CatalogError> {
        self.entries
            .write()
            .map_err(|_| CatalogError::Unavailable("lock poisoned".to_string()))?
            .insert(key, entry);
        Ok(())
    }
}

impl ItemCatalog for InMemoryItemCatalog {
    fn lookup_many(
        &self,
        keys: &[CatalogKey],
    ) -> Result<HashMap<CatalogKey, CatalogEntry>, CatalogError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CatalogError::Unavailable("lock poisoned".to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|entry| (*key, entry.clone())))
            .collect())
    }
}
