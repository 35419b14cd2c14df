#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;

use folioquant::domain::bar::PriceBar;
use folioquant::domain::error::EngineError;
use folioquant::domain::holding::{HoldingLot, HoldingsSnapshot};
use folioquant::domain::region::Region;
use folioquant::ports::holdings_port::HoldingsPort;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, region: Region, date_str: &str, close: f64) -> PriceBar {
    PriceBar {
        symbol: symbol.to_string(),
        region,
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: Some(close - 1.0),
        high: Some(close + 1.0),
        low: Some(close - 2.0),
        close,
        volume: Some(1000),
        adjusted_close: Some(close),
    }
}

/// Consecutive-day bars starting at `start_date`, closing at
/// `start_price + i`.
pub fn generate_bars(
    symbol: &str,
    region: Region,
    start_date: &str,
    count: usize,
    start_price: f64,
) -> Vec<PriceBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| PriceBar {
            symbol: symbol.to_string(),
            region,
            date: start + chrono::Days::new(i as u64),
            open: Some(start_price + i as f64),
            high: Some(start_price + i as f64 + 1.0),
            low: Some(start_price + i as f64 - 1.0),
            close: start_price + i as f64,
            volume: Some(1000),
            adjusted_close: Some(start_price + i as f64),
        })
        .collect()
}

pub fn lot(symbol: &str, region: Region, quantity: f64, stock_type: &str, rating: &str) -> HoldingLot {
    HoldingLot {
        symbol: symbol.to_string(),
        region,
        quantity,
        stock_type: stock_type.to_string(),
        rating: rating.to_string(),
    }
}

pub struct MockHoldings {
    pub lots: HashMap<Region, Vec<HoldingLot>>,
    pub errors: HashMap<Region, String>,
}

impl MockHoldings {
    pub fn new() -> Self {
        Self {
            lots: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_lots(mut self, region: Region, lots: Vec<HoldingLot>) -> Self {
        self.lots.insert(region, lots);
        self
    }

    pub fn with_error(mut self, region: Region, reason: &str) -> Self {
        self.errors.insert(region, reason.to_string());
        self
    }
}

impl HoldingsPort for MockHoldings {
    fn fetch_holdings(&self, region: Region) -> Result<HoldingsSnapshot, EngineError> {
        if let Some(reason) = self.errors.get(&region) {
            return Err(EngineError::UpstreamUnavailable {
                reason: reason.clone(),
            });
        }
        Ok(HoldingsSnapshot::new(
            region,
            self.lots.get(&region).cloned().unwrap_or_default(),
        ))
    }
}
