//! Indicator store port trait.

use crate::domain::error::EngineError;
use crate::domain::indicator::{MacdRecord, MovingAverageRecord, RsiRecord};
use crate::domain::recompute::{IndicatorWrite, SeriesState};
use crate::domain::region::Region;

pub trait IndicatorStorePort {
    /// Bookkeeping for one series; `None` before any bar has been stored.
    fn series_state(&self, symbol: &str, region: Region)
        -> Result<Option<SeriesState>, EngineError>;

    /// Most recent MACD row, used to continue the EMA recurrences.
    fn last_macd(&self, symbol: &str, region: Region) -> Result<Option<MacdRecord>, EngineError>;

    /// Transactional write of one recompute run. Fails with
    /// `RecomputeConflict` (writing nothing) when the series revision no
    /// longer matches `write.expected_revision`.
    fn replace_indicators(
        &self,
        symbol: &str,
        region: Region,
        write: &IndicatorWrite,
    ) -> Result<(), EngineError>;

    /// The most recent `limit` rows, ascending by date.
    fn moving_averages(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<MovingAverageRecord>, EngineError>;

    fn macd(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<MacdRecord>, EngineError>;

    fn rsi(&self, symbol: &str, region: Region, limit: usize)
        -> Result<Vec<RsiRecord>, EngineError>;
}
