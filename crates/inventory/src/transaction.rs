use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{AuditId, DomainError, DomainResult, StockItemId, TransactionId, UserId};

/// Closed set of balance-affecting ledger events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Incoming,
    Outgoing,
    Disposal,
    /// Correction; its quantity is already a signed delta.
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Incoming => "incoming",
            TransactionType::Outgoing => "outgoing",
            TransactionType::Disposal => "disposal",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Signed balance effect of an entry of this type.
    ///
    /// This is the only place the sign convention lives. Posting applies it,
    /// forward replay applies it, backward replay negates it.
    pub fn effect(self, quantity: Decimal) -> Decimal {
        match self {
            TransactionType::Incoming => quantity,
            TransactionType::Outgoing | TransactionType::Disposal => -quantity,
            TransactionType::Adjustment => quantity,
        }
    }

    /// Whether the quantity carries its own sign.
    pub fn is_signed(self) -> bool {
        matches!(self, TransactionType::Adjustment)
    }

    pub fn validate_quantity(self, quantity: Decimal) -> DomainResult<()> {
        if !self.is_signed() && quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "{} quantity must be non-negative (got {quantity})",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incoming" => Ok(TransactionType::Incoming),
            "outgoing" => Ok(TransactionType::Outgoing),
            "disposal" => Ok(TransactionType::Disposal),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(DomainError::validation(format!(
                "type must be one of: incoming, outgoing, disposal, adjustment (got '{other}')"
            ))),
        }
    }
}

/// What caused a ledger entry (purchase order, production run, audit...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionReference {
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl TransactionReference {
    pub const STOCK_AUDIT: &'static str = "stock_audit";

    pub fn new(reference_type: impl Into<String>, reference_id: Uuid) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id,
        }
    }

    pub fn audit(audit_id: AuditId) -> Self {
        Self::new(Self::STOCK_AUDIT, audit_id.into())
    }
}

/// Command: PostTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransaction {
    pub stock_item_id: StockItemId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub actor_id: UserId,
    pub notes: Option<String>,
    pub reference: Option<TransactionReference>,
}

impl PostTransaction {
    /// Validate the command and return the signed balance delta it will apply.
    pub fn signed_delta(&self) -> DomainResult<Decimal> {
        self.transaction_type.validate_quantity(self.quantity)?;
        Ok(self.transaction_type.effect(self.quantity))
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub stock_item_id: StockItemId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub actor_id: UserId,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub notes: String,
    pub item_name_snapshot: String,
    pub unit_snapshot: String,
}

impl StockTransaction {
    /// Materialize a validated command as a ledger entry.
    pub fn record(
        cmd: &PostTransaction,
        item_name: impl Into<String>,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            stock_item_id: cmd.stock_item_id,
            transaction_type: cmd.transaction_type,
            quantity: cmd.quantity,
            timestamp,
            actor_id: cmd.actor_id,
            reference_id: cmd.reference.as_ref().map(|r| r.reference_id),
            reference_type: cmd.reference.as_ref().map(|r| r.reference_type.clone()),
            notes: cmd.notes.clone().unwrap_or_default(),
            item_name_snapshot: item_name.into(),
            unit_snapshot: unit.into(),
        }
    }

    pub fn signed_effect(&self) -> Decimal {
        self.transaction_type.effect(self.quantity)
    }

    pub fn reference(&self) -> Option<TransactionReference> {
        match (&self.reference_type, self.reference_id) {
            (Some(t), Some(id)) => Some(TransactionReference::new(t.clone(), id)),
            _ => None,
        }
    }
}
