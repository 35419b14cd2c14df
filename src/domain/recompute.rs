//! Recompute orchestration: full rebuild versus incremental extension.
//!
//! EMA and RSI recurrences are order-sensitive and non-commutative, so a
//! backfill (any bar landing before the latest stored date, or an in-place
//! change) invalidates the whole series for that symbol/region. Clean
//! appends extend the persisted recurrence state instead. Writes are
//! guarded by the series revision read at the start of the run; if bars
//! moved underneath the computation, nothing is written and the caller
//! retries the whole symbol/region.

use chrono::NaiveDate;

use crate::domain::bar::StoredBar;
use crate::domain::error::EngineError;
use crate::domain::indicator::{macd, moving_average, rsi, IndicatorRows};
use crate::domain::region::Region;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::price_store_port::PriceStorePort;

/// Bookkeeping row per (symbol, region) price series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesState {
    /// Bumped by the store on every bar write for this series.
    pub revision: i64,
    /// Set by the store when a backfill rewrote history.
    pub needs_full_recompute: bool,
    /// Last date with indicator rows, if any compute has run.
    pub last_computed_date: Option<NaiveDate>,
    /// Wilder averages as of `last_computed_date`, once seeded.
    pub rsi_state: Option<rsi::RsiState>,
}

impl Default for SeriesState {
    fn default() -> Self {
        Self {
            revision: 0,
            needs_full_recompute: true,
            last_computed_date: None,
            rsi_state: None,
        }
    }
}

/// One transactional indicator write, validated against the revision the
/// computation was based on.
#[derive(Debug, Clone)]
pub struct IndicatorWrite {
    pub expected_revision: i64,
    /// Replace every stored row for the series, or upsert appended rows only.
    pub full: bool,
    pub rows: IndicatorRows,
    pub last_computed_date: NaiveDate,
    pub rsi_state: Option<rsi::RsiState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    Full { rows: usize },
    Incremental { rows: usize },
    UpToDate,
}

pub struct RecomputeService<'a> {
    prices: &'a dyn PriceStorePort,
    indicators: &'a dyn IndicatorStorePort,
}

impl<'a> RecomputeService<'a> {
    pub fn new(prices: &'a dyn PriceStorePort, indicators: &'a dyn IndicatorStorePort) -> Self {
        Self { prices, indicators }
    }

    /// Recompute all three indicator families for one symbol/region.
    ///
    /// Reads the series state before the bars so that any write landing in
    /// between is caught by the revision check at commit time.
    pub fn recompute(&self, symbol: &str, region: Region) -> Result<RecomputeOutcome, EngineError> {
        let state = self
            .indicators
            .series_state(symbol, region)?
            .unwrap_or_default();
        let bars = self.prices.all_bars(symbol, region)?;

        if bars.is_empty() {
            return Err(EngineError::MissingData {
                symbol: symbol.to_string(),
                region: region.to_string(),
            });
        }

        match self.incremental_plan(symbol, region, &state, &bars)? {
            IncrementalPlan::UpToDate => Ok(RecomputeOutcome::UpToDate),
            IncrementalPlan::Extend {
                split,
                macd_seed,
                rsi_seed,
            } => self.extend(symbol, region, &state, &bars, split, macd_seed, &rsi_seed),
            IncrementalPlan::Full => self.full(symbol, region, &state, &bars),
        }
    }

    fn incremental_plan(
        &self,
        symbol: &str,
        region: Region,
        state: &SeriesState,
        bars: &[StoredBar],
    ) -> Result<IncrementalPlan, EngineError> {
        if state.needs_full_recompute {
            return Ok(IncrementalPlan::Full);
        }
        let Some(last_computed) = state.last_computed_date else {
            return Ok(IncrementalPlan::Full);
        };

        let split = bars.partition_point(|sb| sb.bar.date <= last_computed);
        if split == bars.len() {
            return Ok(IncrementalPlan::UpToDate);
        }

        // The recurrences can only be continued once both the slow EMA and
        // the slowest Wilder average have seeded; otherwise the warmup
        // arithmetic needs the full history anyway.
        let Some(rsi_seed) = state.rsi_state.clone() else {
            return Ok(IncrementalPlan::Full);
        };
        let Some(macd_seed) = self
            .indicators
            .last_macd(symbol, region)?
            .and_then(|record| macd::seed_from_last(std::slice::from_ref(&record)))
        else {
            return Ok(IncrementalPlan::Full);
        };

        Ok(IncrementalPlan::Extend {
            split,
            macd_seed,
            rsi_seed,
        })
    }

    fn full(
        &self,
        symbol: &str,
        region: Region,
        state: &SeriesState,
        bars: &[StoredBar],
    ) -> Result<RecomputeOutcome, EngineError> {
        let moving_averages = moving_average::compute(bars);
        let macd_rows = macd::compute(bars);
        let (rsi_rows, rsi_state) = rsi::compute(bars);
        let rows = IndicatorRows {
            moving_averages,
            macd: macd_rows,
            rsi: rsi_rows,
        };
        let count = rows.len();

        self.indicators.replace_indicators(
            symbol,
            region,
            &IndicatorWrite {
                expected_revision: state.revision,
                full: true,
                rows,
                last_computed_date: bars[bars.len() - 1].bar.date,
                rsi_state,
            },
        )?;

        Ok(RecomputeOutcome::Full { rows: count })
    }

    #[allow(clippy::too_many_arguments)]
    fn extend(
        &self,
        symbol: &str,
        region: Region,
        state: &SeriesState,
        bars: &[StoredBar],
        split: usize,
        macd_seed: macd::MacdSeed,
        rsi_seed: &rsi::RsiState,
    ) -> Result<RecomputeOutcome, EngineError> {
        let new_bars = &bars[split..];

        // Window math over the whole series, keeping only the appended
        // dates, so the values are bit-identical to a full rebuild.
        let moving_averages = moving_average::compute(bars).split_off(split);

        let (macd_rows, _) = macd::extend(macd_seed, new_bars);
        let (rsi_rows, rsi_state) = rsi::extend(rsi_seed, new_bars);

        let rows = IndicatorRows {
            moving_averages,
            macd: macd_rows,
            rsi: rsi_rows,
        };
        let count = rows.len();

        self.indicators.replace_indicators(
            symbol,
            region,
            &IndicatorWrite {
                expected_revision: state.revision,
                full: false,
                rows,
                last_computed_date: bars[bars.len() - 1].bar.date,
                rsi_state: Some(rsi_state),
            },
        )?;

        Ok(RecomputeOutcome::Incremental { rows: count })
    }
}

enum IncrementalPlan {
    Full,
    Extend {
        split: usize,
        macd_seed: macd::MacdSeed,
        rsi_seed: rsi::RsiState,
    },
    UpToDate,
}
