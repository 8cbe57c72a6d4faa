use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{CompanyId, DomainError, StockItemId, WarehouseId};

/// Kind of catalog item a stock item tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Ingredient,
    Container,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Ingredient => "ingredient",
            ItemType::Container => "container",
        }
    }
}

impl core::fmt::Display for ItemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ingredient" => Ok(ItemType::Ingredient),
            "container" => Ok(ItemType::Container),
            other => Err(DomainError::validation(format!(
                "item type must be one of: ingredient, container (got '{other}')"
            ))),
        }
    }
}

/// Key into the external item catalog: `(itemType, itemId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogKey {
    pub item_type: ItemType,
    pub item_id: Uuid,
}

impl CatalogKey {
    pub fn new(item_type: ItemType, item_id: Uuid) -> Self {
        Self { item_type, item_id }
    }
}

impl core::fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.item_type, self.item_id)
    }
}

/// Command: start tracking a catalog item in a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStockItem {
    pub company_id: CompanyId,
    pub key: CatalogKey,
    pub warehouse_id: WarehouseId,
    pub unit: String,
}

/// The trackable unit: one catalog item within one warehouse.
///
/// `current_quantity` is the materialized running sum of the item's ledger.
/// `version` increments on every balance write and backs the conditional
/// update writers use to serialize per-item read-modify-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub company_id: CompanyId,
    pub item_type: ItemType,
    pub item_id: Uuid,
    pub warehouse_id: WarehouseId,
    pub current_quantity: Decimal,
    pub unit: String,
    pub last_updated: DateTime<Utc>,
    pub version: u64,
}

impl StockItem {
    /// Create a freshly tracked item with a zero balance.
    pub fn register(cmd: &RegisterStockItem, at: DateTime<Utc>) -> Result<Self, DomainError> {
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        Ok(Self {
            id: StockItemId::new(),
            company_id: cmd.company_id,
            item_type: cmd.key.item_type,
            item_id: cmd.key.item_id,
            warehouse_id: cmd.warehouse_id,
            current_quantity: Decimal::ZERO,
            unit: cmd.unit.trim().to_string(),
            last_updated: at,
            version: 0,
        })
    }

    pub fn catalog_key(&self) -> CatalogKey {
        CatalogKey::new(self.item_type, self.item_id)
    }

    /// Next state after a balance write.
    pub fn with_balance(&self, quantity: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            current_quantity: quantity,
            last_updated: at,
            version: self.version + 1,
            ..self.clone()
        }
    }
}
