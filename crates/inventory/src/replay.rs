//! Historical balance reconstruction (pure).
//!
//! Two ways to answer "what was the balance at end of day D":
//! - **backward**: start from the current balance and undo every entry after D
//! - **forward**: start from a snapshot taken at or before D and apply every
//!   entry between the snapshot day and D
//!
//! Both walk the ledger through `TransactionType::effect`, so for a complete
//! ledger they agree by construction.
//!
//! Day boundaries are evaluated in UTC. "End of day D" is the exclusive bound
//! `start_of_day(D + 1)`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};

use crate::snapshot::StockSnapshot;
use crate::transaction::StockTransaction;

/// How a reconstructed balance was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMethod {
    /// Backward replay from the live balance.
    Realtime,
    /// Stored snapshot value, unchanged.
    Snapshot,
    /// Snapshot plus forward replay.
    Hybrid,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::Realtime => "realtime",
            CalculationMethod::Snapshot => "snapshot",
            CalculationMethod::Hybrid => "hybrid",
        }
    }
}

impl core::fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound of `date`.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date.succ_opt().unwrap_or(NaiveDate::MAX))
}

/// Half-open time range `[from, until)` over ledger timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LedgerWindow {
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything recorded after the end of `day`.
    pub fn after_day(day: NaiveDate) -> Self {
        Self {
            from: Some(end_of_day(day)),
            until: None,
        }
    }

    /// Everything recorded after the end of `from_day` up to the end of `to_day`.
    pub fn between_days(from_day: NaiveDate, to_day: NaiveDate) -> Self {
        Self {
            from: Some(end_of_day(from_day)),
            until: Some(end_of_day(to_day)),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| timestamp >= from)
            && self.until.is_none_or(|until| timestamp < until)
    }

    /// Smallest window covering both.
    pub fn union(&self, other: &LedgerWindow) -> LedgerWindow {
        LedgerWindow {
            from: match (self.from, other.from) {
                (Some(a), Some(b)) => Some(a.min(b)),
                _ => None,
            },
            until: match (self.until, other.until) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }
}

/// Which replay a query should use, by age of the target date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStrategy {
    Backward,
    FromSnapshot,
}

/// Pick the replay strategy for `target` as seen on `today`.
///
/// Targets at most `recent_window_days` whole days old replay backward from the
/// live balance; older targets start from a snapshot. Future targets are invalid.
pub fn select_strategy(
    today: NaiveDate,
    target: NaiveDate,
    recent_window_days: i64,
) -> DomainResult<ReplayStrategy> {
    let age_days = today.signed_duration_since(target).num_days();
    if age_days < 0 {
        return Err(DomainError::validation(format!(
            "target date {target} is in the future (today is {today})"
        )));
    }
    if age_days <= recent_window_days {
        Ok(ReplayStrategy::Backward)
    } else {
        Ok(ReplayStrategy::FromSnapshot)
    }
}

/// Outcome of reconstructing one item's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replayed {
    /// Unclamped result. Negative values point at missing entries or a bad snapshot.
    pub raw_quantity: Decimal,
    pub method: CalculationMethod,
    pub transactions_applied: usize,
    pub snapshot_date: Option<NaiveDate>,
}

impl Replayed {
    pub fn display_quantity(&self) -> Decimal {
        clamp_for_display(self.method, self.raw_quantity)
    }

    pub fn is_negative(&self) -> bool {
        self.raw_quantity < Decimal::ZERO
    }
}

/// Display value of a reconstructed quantity.
///
/// Replayed values are floored at zero; stored snapshot values are shown as-is.
pub fn clamp_for_display(method: CalculationMethod, raw: Decimal) -> Decimal {
    match method {
        CalculationMethod::Snapshot => raw,
        CalculationMethod::Realtime | CalculationMethod::Hybrid => raw.max(Decimal::ZERO),
    }
}

/// Balance at end of `target`, undoing later entries from `current`.
///
/// `transactions` may contain entries outside the window; they are skipped.
pub fn replay_backward<'a, I>(current: Decimal, target: NaiveDate, transactions: I) -> DomainResult<Replayed>
where
    I: IntoIterator<Item = &'a StockTransaction>,
{
    let window = LedgerWindow::after_day(target);
    let mut quantity = current;
    let mut applied = 0;

    for tx in transactions.into_iter().filter(|tx| window.contains(tx.timestamp)) {
        quantity = quantity
            .checked_sub(tx.signed_effect())
            .ok_or_else(|| overflow(tx))?;
        applied += 1;
    }

    Ok(Replayed {
        raw_quantity: quantity,
        method: CalculationMethod::Realtime,
        transactions_applied: applied,
        snapshot_date: None,
    })
}

/// Balance at end of `target`, applying entries recorded after `snapshot`.
///
/// Expects `snapshot.snapshot_date <= target`. A snapshot taken on `target`
/// itself is returned unchanged.
pub fn replay_forward<'a, I>(
    snapshot: &StockSnapshot,
    target: NaiveDate,
    transactions: I,
) -> DomainResult<Replayed>
where
    I: IntoIterator<Item = &'a StockTransaction>,
{
    if snapshot.snapshot_date == target {
        return Ok(Replayed {
            raw_quantity: snapshot.quantity,
            method: CalculationMethod::Snapshot,
            transactions_applied: 0,
            snapshot_date: Some(snapshot.snapshot_date),
        });
    }

    let window = LedgerWindow::between_days(snapshot.snapshot_date, target);
    let mut quantity = snapshot.quantity;
    let mut applied = 0;

    for tx in transactions.into_iter().filter(|tx| window.contains(tx.timestamp)) {
        quantity = quantity
            .checked_add(tx.signed_effect())
            .ok_or_else(|| overflow(tx))?;
        applied += 1;
    }

    Ok(Replayed {
        raw_quantity: quantity,
        method: CalculationMethod::Hybrid,
        transactions_applied: applied,
        snapshot_date: Some(snapshot.snapshot_date),
    })
}

fn overflow(tx: &StockTransaction) -> DomainError {
    DomainError::invariant(format!(
        "stock item {}: replaying transaction {} overflows the balance",
        tx.stock_item_id, tx.id
    ))
}
