//! Portfolio valuation: holdings × price series → value series and
//! allocation breakdowns.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::error::EngineError;
use crate::domain::holding::{HoldingLot, HoldingsSnapshot};
use crate::domain::range::DateRange;
use crate::domain::region::{Region, BENCHMARK_REGION};
use crate::ports::price_store_port::PriceStorePort;

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioValuationPoint {
    pub region: Region,
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub benchmark_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSlice {
    pub label: String,
    pub value: f64,
    /// Percentage share at full precision; round only when presenting.
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct AllocationBreakdown {
    pub date: NaiveDate,
    pub by_stock_type: Vec<AllocationSlice>,
    pub by_rating: Vec<AllocationSlice>,
}

pub struct ValuationAggregator<'a> {
    prices: &'a dyn PriceStorePort,
}

impl<'a> ValuationAggregator<'a> {
    pub fn new(prices: &'a dyn PriceStorePort) -> Self {
        Self { prices }
    }

    /// Portfolio value per benchmark trading date in `range`.
    ///
    /// The benchmark's dates form the axis; a holding without a bar on a
    /// given date contributes 0 for that date rather than failing the
    /// whole computation.
    pub fn valuation_series(
        &self,
        snapshot: &HoldingsSnapshot,
        benchmark_symbol: &str,
        range: &DateRange,
    ) -> Result<Vec<PortfolioValuationPoint>, EngineError> {
        let benchmark_bars =
            self.prices
                .bars_in_range(benchmark_symbol, BENCHMARK_REGION, range)?;
        if benchmark_bars.is_empty() {
            return Err(EngineError::MissingData {
                symbol: benchmark_symbol.to_string(),
                region: BENCHMARK_REGION.to_string(),
            });
        }

        let priced_lots: Vec<(&HoldingLot, HashMap<NaiveDate, f64>)> = snapshot
            .lots
            .iter()
            .map(|lot| (lot, self.closes_for(lot, range)))
            .collect();

        let points = benchmark_bars
            .iter()
            .map(|benchmark_bar| {
                let date = benchmark_bar.bar.date;
                let portfolio_value = priced_lots
                    .iter()
                    .map(|(lot, closes)| match closes.get(&date) {
                        Some(close) => lot.quantity * close,
                        None => {
                            debug!(symbol = %lot.symbol, %date, "no bar for holding, contributes 0");
                            0.0
                        }
                    })
                    .sum();
                PortfolioValuationPoint {
                    region: snapshot.region,
                    date,
                    portfolio_value,
                    benchmark_value: benchmark_bar.bar.close,
                }
            })
            .collect();

        Ok(points)
    }

    /// Allocation by stock type and by rating on one date. Weights stay at
    /// full precision internally; presentation rounds them.
    pub fn allocation_breakdown(
        &self,
        snapshot: &HoldingsSnapshot,
        date: NaiveDate,
    ) -> Result<AllocationBreakdown, EngineError> {
        let navs: Vec<(&HoldingLot, f64)> = snapshot
            .lots
            .iter()
            .map(|lot| {
                let nav = match self.close_on(lot, date) {
                    Some(close) => lot.quantity * close,
                    None => {
                        warn!(symbol = %lot.symbol, %date, "no price for holding, weighting as 0");
                        0.0
                    }
                };
                (lot, nav)
            })
            .collect();

        Ok(AllocationBreakdown {
            date,
            by_stock_type: group_weights(&navs, |lot| lot.stock_type.clone()),
            by_rating: group_weights(&navs, |lot| lot.rating.clone()),
        })
    }

    /// Close prices for the lot's resolved symbol over `range`. Candidates
    /// are tried most-specific first; the first with any stored bars wins.
    fn closes_for(&self, lot: &HoldingLot, range: &DateRange) -> HashMap<NaiveDate, f64> {
        for candidate in lot.region.priced_symbol_candidates(&lot.symbol) {
            match self.prices.bars_in_range(&candidate, lot.region, range) {
                Ok(bars) if !bars.is_empty() => {
                    return bars
                        .into_iter()
                        .map(|sb| (sb.bar.date, sb.bar.close))
                        .collect();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol = %candidate, error = %e, "price lookup failed, trying fallback");
                }
            }
        }
        warn!(symbol = %lot.symbol, region = %lot.region, "no priced series for holding");
        HashMap::new()
    }

    fn close_on(&self, lot: &HoldingLot, date: NaiveDate) -> Option<f64> {
        for candidate in lot.region.priced_symbol_candidates(&lot.symbol) {
            match self.prices.close_on(&candidate, lot.region, date) {
                Ok(Some(close)) => return Some(close),
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %candidate, error = %e, "price lookup failed, trying fallback");
                }
            }
        }
        None
    }
}

fn group_weights<F>(navs: &[(&HoldingLot, f64)], key: F) -> Vec<AllocationSlice>
where
    F: Fn(&HoldingLot) -> String,
{
    let total: f64 = navs.iter().map(|(_, nav)| nav).sum();

    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, f64> = HashMap::new();
    for (lot, nav) in navs {
        let label = key(lot);
        if !sums.contains_key(&label) {
            order.push(label.clone());
        }
        *sums.entry(label).or_insert(0.0) += nav;
    }

    order
        .into_iter()
        .map(|label| {
            let value = sums[&label];
            let weight = if total > 0.0 {
                value / total * 100.0
            } else {
                0.0
            };
            AllocationSlice {
                label,
                value,
                weight,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::region::Region;

    fn lot(symbol: &str, quantity: f64, stock_type: &str, rating: &str) -> HoldingLot {
        HoldingLot {
            symbol: symbol.into(),
            region: Region::Usd,
            quantity,
            stock_type: stock_type.into(),
            rating: rating.into(),
        }
    }

    #[test]
    fn group_weights_sum_to_100_at_full_precision() {
        let a = lot("A", 1.0, "Common", "A");
        let b = lot("B", 1.0, "Common", "B");
        let c = lot("C", 1.0, "ETF", "A");
        let navs = vec![(&a, 100.0), (&b, 200.0), (&c, 33.0)];

        let by_type = group_weights(&navs, |l| l.stock_type.clone());
        assert_eq!(by_type.len(), 2);
        let total_weight: f64 = by_type.iter().map(|s| s.weight).sum();
        assert!((total_weight - 100.0).abs() < 1e-9);
        assert!((by_type[0].value - 300.0).abs() < f64::EPSILON);
        assert!((by_type[1].value - 33.0).abs() < f64::EPSILON);
    }

    #[test]
    fn group_weights_zero_total() {
        let a = lot("A", 1.0, "Common", "A");
        let navs = vec![(&a, 0.0)];
        let slices = group_weights(&navs, |l| l.rating.clone());
        assert_eq!(slices[0].weight, 0.0);
    }

    #[test]
    fn group_weights_preserve_first_seen_order() {
        let a = lot("A", 1.0, "ETF", "B");
        let b = lot("B", 1.0, "Common", "A");
        let c = lot("C", 1.0, "ETF", "A");
        let navs = vec![(&a, 1.0), (&b, 1.0), (&c, 1.0)];

        let by_type = group_weights(&navs, |l| l.stock_type.clone());
        let labels: Vec<&str> = by_type.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["ETF", "Common"]);
    }
}
