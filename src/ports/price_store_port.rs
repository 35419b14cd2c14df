//! Price series store port trait.

use chrono::NaiveDate;

use crate::domain::bar::{PriceBar, StoredBar, UpsertOutcome};
use crate::domain::error::EngineError;
use crate::domain::range::DateRange;
use crate::domain::region::Region;

pub trait PriceStorePort {
    /// Idempotent insert-or-overwrite of the bar for its
    /// (symbol, date, region) key. Bars failing validation are rejected
    /// without persisting anything.
    fn upsert_bar(&self, bar: &PriceBar) -> Result<UpsertOutcome, EngineError>;

    /// Bars in the inclusive range, ascending by date.
    fn bars_in_range(
        &self,
        symbol: &str,
        region: Region,
        range: &DateRange,
    ) -> Result<Vec<StoredBar>, EngineError>;

    /// Full history for one series, ascending by date.
    fn all_bars(&self, symbol: &str, region: Region) -> Result<Vec<StoredBar>, EngineError>;

    fn close_on(
        &self,
        symbol: &str,
        region: Region,
        date: NaiveDate,
    ) -> Result<Option<f64>, EngineError>;

    /// (first date, last date, bar count) for a series, if any data exists.
    fn data_range(
        &self,
        symbol: &str,
        region: Region,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, EngineError>;

    fn list_symbols(&self, region: Region) -> Result<Vec<String>, EngineError>;

    /// Explicit dedup-cleanup removal. Marks the series for full recompute;
    /// computed indicator rows are left in place until the next pass.
    fn delete_bar(
        &self,
        symbol: &str,
        region: Region,
        date: NaiveDate,
    ) -> Result<bool, EngineError>;
}
