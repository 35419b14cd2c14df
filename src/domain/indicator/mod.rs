//! Indicator record types and family modules.
//!
//! One record type per indicator family, one row per bar per family, uniquely
//! keyed by (symbol, date, region). `source_bar_id` is a non-owning
//! back-reference to the bar a row was derived from: it drives incremental
//! recomputation and is never used for lifecycle control.

pub mod macd;
pub mod moving_average;
pub mod rsi;

use chrono::NaiveDate;

use crate::domain::bar::StoredBar;
use crate::domain::region::Region;

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageRecord {
    pub symbol: String,
    pub region: Region,
    pub date: NaiveDate,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub source_bar_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdRecord {
    pub symbol: String,
    pub region: Region,
    pub date: NaiveDate,
    pub fast_ema: Option<f64>,
    pub slow_ema: Option<f64>,
    pub histogram: Option<f64>,
    pub source_bar_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RsiRecord {
    pub symbol: String,
    pub region: Region,
    pub date: NaiveDate,
    pub rsi9: Option<f64>,
    pub rsi14: Option<f64>,
    pub rsi21: Option<f64>,
    pub source_bar_id: i64,
}

/// All three families computed over one bar set, sharing the date index.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRows {
    pub moving_averages: Vec<MovingAverageRecord>,
    pub macd: Vec<MacdRecord>,
    pub rsi: Vec<RsiRecord>,
}

impl IndicatorRows {
    pub fn len(&self) -> usize {
        self.moving_averages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moving_averages.is_empty()
    }
}

pub(crate) fn closes(bars: &[StoredBar]) -> Vec<f64> {
    bars.iter().map(|sb| sb.bar.close).collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::domain::bar::PriceBar;

    /// Flat-field bars with consecutive dates, ids 1..=n.
    pub fn make_bars(prices: &[f64]) -> Vec<StoredBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| StoredBar {
                id: i as i64 + 1,
                bar: PriceBar {
                    symbol: "TEST".into(),
                    region: Region::Usd,
                    date: start + chrono::Days::new(i as u64),
                    open: Some(close),
                    high: Some(close),
                    low: Some(close),
                    close,
                    volume: Some(1000),
                    adjusted_close: Some(close),
                },
            })
            .collect()
    }
}
