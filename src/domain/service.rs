//! Facade exposed to collaborators.
//!
//! Constructed per call site with explicit store and collaborator
//! dependencies; the engine holds no ambient global state.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;

use chrono::NaiveDate;

use crate::domain::batch::{run_batch, BatchSummary, RecomputeTask};
use crate::domain::error::EngineError;
use crate::domain::indicator::{MacdRecord, MovingAverageRecord, RsiRecord};
use crate::domain::performance::{self, PerformancePoint};
use crate::domain::range::{DateRange, TimeRange};
use crate::domain::recompute::{RecomputeOutcome, RecomputeService};
use crate::domain::region::{Benchmarks, Region, BENCHMARK_REGION};
use crate::domain::valuation::{AllocationBreakdown, PortfolioValuationPoint, ValuationAggregator};
use crate::ports::holdings_port::HoldingsPort;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::price_store_port::PriceStorePort;

/// The most recent rows of all three indicator families for one series,
/// each in ascending date order.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    pub moving_averages: Vec<MovingAverageRecord>,
    pub macd: Vec<MacdRecord>,
    pub rsi: Vec<RsiRecord>,
}

pub struct AnalyticsService<'a> {
    prices: &'a (dyn PriceStorePort + Sync),
    indicators: &'a (dyn IndicatorStorePort + Sync),
    holdings: &'a dyn HoldingsPort,
    benchmarks: Benchmarks,
}

impl<'a> AnalyticsService<'a> {
    pub fn new(
        prices: &'a (dyn PriceStorePort + Sync),
        indicators: &'a (dyn IndicatorStorePort + Sync),
        holdings: &'a dyn HoldingsPort,
        benchmarks: Benchmarks,
    ) -> Self {
        Self {
            prices,
            indicators,
            holdings,
            benchmarks,
        }
    }

    pub fn indicators(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<IndicatorSnapshot, EngineError> {
        Ok(IndicatorSnapshot {
            moving_averages: self.indicators.moving_averages(symbol, region, limit)?,
            macd: self.indicators.macd(symbol, region, limit)?,
            rsi: self.indicators.rsi(symbol, region, limit)?,
        })
    }

    /// Recompute one symbol/region, retrying once on a concurrent-backfill
    /// conflict before surfacing it.
    pub fn recompute_indicators(
        &self,
        symbol: &str,
        region: Region,
    ) -> Result<RecomputeOutcome, EngineError> {
        let service = RecomputeService::new(self.prices, self.indicators);
        match service.recompute(symbol, region) {
            Err(EngineError::RecomputeConflict { .. }) => service.recompute(symbol, region),
            other => other,
        }
    }

    /// Recompute every priced series a region's portfolio depends on: each
    /// holding's resolved symbol plus the region's benchmark.
    pub fn recompute_portfolio(
        &self,
        region: Region,
        workers: usize,
        cancel: &AtomicBool,
    ) -> Result<BatchSummary, EngineError> {
        let snapshot = self.holdings.fetch_holdings(region)?;

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for lot in &snapshot.lots {
            let symbol = self.resolve_priced_symbol(&lot.symbol, lot.region)?;
            if seen.insert((symbol.clone(), lot.region)) {
                tasks.push(RecomputeTask::new(symbol, lot.region));
            }
        }
        let benchmark = self.benchmarks.symbol_for(region).to_string();
        if seen.insert((benchmark.clone(), BENCHMARK_REGION)) {
            tasks.push(RecomputeTask::new(benchmark, BENCHMARK_REGION));
        }

        run_batch(self.prices, self.indicators, tasks, workers, cancel)
    }

    pub fn valuation_series(
        &self,
        region: Region,
        range: &DateRange,
    ) -> Result<Vec<PortfolioValuationPoint>, EngineError> {
        let snapshot = self.holdings.fetch_holdings(region)?;
        ValuationAggregator::new(self.prices).valuation_series(
            &snapshot,
            self.benchmarks.symbol_for(region),
            range,
        )
    }

    pub fn performance_series(
        &self,
        region: Region,
        time_range: TimeRange,
        as_of: NaiveDate,
    ) -> Result<Vec<PerformancePoint>, EngineError> {
        let range = time_range.window(as_of);
        let points = self.valuation_series(region, &range)?;
        Ok(performance::from_valuation(&points))
    }

    pub fn allocation(
        &self,
        region: Region,
        date: NaiveDate,
    ) -> Result<AllocationBreakdown, EngineError> {
        let snapshot = self.holdings.fetch_holdings(region)?;
        ValuationAggregator::new(self.prices).allocation_breakdown(&snapshot, date)
    }

    /// First candidate with stored data, falling back to the most specific
    /// candidate when none has any.
    fn resolve_priced_symbol(&self, symbol: &str, region: Region) -> Result<String, EngineError> {
        let candidates = region.priced_symbol_candidates(symbol);
        for candidate in &candidates {
            if self.prices.data_range(candidate, region)?.is_some() {
                return Ok(candidate.clone());
            }
        }
        Ok(candidates.into_iter().next().unwrap_or_else(|| symbol.to_string()))
    }
}
