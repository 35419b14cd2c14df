//! Cumulative and relative return series versus a benchmark.
//!
//! Both series are rebased to the first common date of the requested
//! window: cumulative_return[i] = value[i]/value[0] - 1. Dates present in
//! one series but not the other are dropped, never interpolated.

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::region::Region;
use crate::domain::valuation::PortfolioValuationPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformancePoint {
    pub region: Region,
    pub date: NaiveDate,
    pub portfolio_cumulative_return: f64,
    pub benchmark_cumulative_return: f64,
    pub relative_performance: f64,
}

/// Join two dated value series and rebase at their first common date with
/// usable (positive) values on both sides. Leading dates without a usable
/// anchor are dropped.
pub fn build(
    region: Region,
    portfolio: &[(NaiveDate, f64)],
    benchmark: &[(NaiveDate, f64)],
) -> Vec<PerformancePoint> {
    let mut joined: Vec<(NaiveDate, f64, f64)> = Vec::new();
    let mut pi = 0;
    let mut bi = 0;

    while pi < portfolio.len() && bi < benchmark.len() {
        let (p_date, p_value) = portfolio[pi];
        let (b_date, b_value) = benchmark[bi];
        if p_date == b_date {
            joined.push((p_date, p_value, b_value));
            pi += 1;
            bi += 1;
        } else if p_date < b_date {
            pi += 1;
        } else {
            bi += 1;
        }
    }

    let anchor = joined
        .iter()
        .position(|&(_, p_value, b_value)| p_value > 0.0 && b_value > 0.0);
    let Some(anchor) = anchor else {
        return Vec::new();
    };
    if anchor > 0 {
        debug!(dropped = anchor, "leading dates without usable values dropped before rebasing");
    }

    let (_, p0, b0) = joined[anchor];
    joined[anchor..]
        .iter()
        .map(|&(date, p_value, b_value)| {
            let portfolio_cumulative_return = p_value / p0 - 1.0;
            let benchmark_cumulative_return = b_value / b0 - 1.0;
            PerformancePoint {
                region,
                date,
                portfolio_cumulative_return,
                benchmark_cumulative_return,
                relative_performance: portfolio_cumulative_return - benchmark_cumulative_return,
            }
        })
        .collect()
}

/// Build from an already-aligned valuation series.
pub fn from_valuation(points: &[PortfolioValuationPoint]) -> Vec<PerformancePoint> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let portfolio: Vec<(NaiveDate, f64)> =
        points.iter().map(|p| (p.date, p.portfolio_value)).collect();
    let benchmark: Vec<(NaiveDate, f64)> =
        points.iter().map(|p| (p.date, p.benchmark_value)).collect();
    build(first.region, &portfolio, &benchmark)
}
