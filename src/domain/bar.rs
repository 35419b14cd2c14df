//! Daily price bar representation.

use chrono::NaiveDate;

use crate::domain::error::EngineError;
use crate::domain::region::Region;

/// A raw daily OHLC bar as supplied by the ingestion collaborator.
///
/// Unique per (symbol, date, region). Only the close is mandatory; vendors
/// routinely omit the other fields for thin listings.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub symbol: String,
    pub region: Region,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<i64>,
    pub adjusted_close: Option<f64>,
}

impl PriceBar {
    /// Reject malformed bars before anything touches the store.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.close.is_finite() {
            return Err(self.invalid("close is not finite"));
        }
        if self.close <= 0.0 {
            return Err(self.invalid("close must be positive"));
        }
        if let (Some(high), Some(low)) = (self.high, self.low) {
            if high < low {
                return Err(self.invalid("high is below low"));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> EngineError {
        EngineError::InvalidBar {
            symbol: self.symbol.clone(),
            region: self.region.to_string(),
            date: self.date.format("%Y-%m-%d").to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A bar as persisted, carrying the store-assigned row id that indicator
/// records back-reference via `source_bar_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBar {
    pub id: i64,
    pub bar: PriceBar,
}

/// Classification of a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
    Unchanged,
}

/// Result of an idempotent bar upsert.
///
/// `backfill` is true when the write rewrote history: a new bar landed
/// before the latest stored date, or an already-stored date changed value.
/// Either case invalidates the incremental indicator recurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    pub backfill: bool,
}
