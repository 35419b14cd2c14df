//! CSV file adapters for the market-data and holdings collaborators.
//!
//! Bar files carry the columns
//! `symbol,date,open,high,low,close,volume,adjusted_close`; only symbol,
//! date and close are required. Holdings files carry
//! `symbol,quantity,stock_type,rating`. Unreadable files surface as
//! `UpstreamUnavailable`; individual malformed rows are skipped and
//! reported, never aborting the batch.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::domain::bar::PriceBar;
use crate::domain::error::EngineError;
use crate::domain::holding::{HoldingLot, HoldingsSnapshot};
use crate::domain::range::parse_date;
use crate::domain::region::Region;
use crate::ports::holdings_port::HoldingsPort;
use crate::ports::market_data_port::MarketDataPort;

/// A row that failed to parse, with its 1-based line number.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

/// Parse a bar CSV into valid bars plus per-row problems.
pub fn read_bar_file(
    path: &Path,
    region: Region,
) -> Result<(Vec<PriceBar>, Vec<RowError>), EngineError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| EngineError::UpstreamUnavailable {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;

    let mut bars = Vec::new();
    let mut errors = Vec::new();

    for (index, result) in reader.records().enumerate() {
        // Header occupies line 1.
        let line = index + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                errors.push(RowError {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match bar_from_record(&record, region) {
            Ok(bar) => bars.push(bar),
            Err(reason) => errors.push(RowError { line, reason }),
        }
    }

    bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
    Ok((bars, errors))
}

fn bar_from_record(record: &csv::StringRecord, region: Region) -> Result<PriceBar, String> {
    let symbol = required_field(record, 0, "symbol")?;
    let date = parse_date(&required_field(record, 1, "date")?).map_err(|e| e.to_string())?;
    let close: f64 = required_field(record, 5, "close")?
        .parse()
        .map_err(|e| format!("invalid close value: {e}"))?;

    let bar = PriceBar {
        symbol,
        region,
        date,
        open: optional_f64(record, 2, "open")?,
        high: optional_f64(record, 3, "high")?,
        low: optional_f64(record, 4, "low")?,
        close,
        volume: optional_i64(record, 6, "volume")?,
        adjusted_close: optional_f64(record, 7, "adjusted_close")?,
    };
    bar.validate().map_err(|e| e.to_string())?;
    Ok(bar)
}

fn required_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<String, String> {
    let value = record
        .get(idx)
        .map(str::trim)
        .unwrap_or_default();
    if value.is_empty() {
        return Err(format!("missing {name} column"));
    }
    Ok(value.to_string())
}

fn optional_f64(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
) -> Result<Option<f64>, String> {
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid {name} value: {e}")),
    }
}

fn optional_i64(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
) -> Result<Option<i64>, String> {
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| format!("invalid {name} value: {e}")),
    }
}

/// Market-data collaborator backed by per-series CSV drops,
/// `{symbol}_{region}.csv` under a base directory.
///
/// The timeout bound of the port contract belongs to network-backed
/// implementations; a local file either reads immediately or surfaces as
/// unavailable.
pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn bar_path(&self, symbol: &str, region: Region) -> PathBuf {
        self.base_path.join(format!("{symbol}_{region}.csv"))
    }
}

impl MarketDataPort for CsvMarketData {
    fn fetch_bars(
        &self,
        symbol: &str,
        region: Region,
        since: NaiveDate,
    ) -> Result<Vec<PriceBar>, EngineError> {
        let path = self.bar_path(symbol, region);
        let (bars, errors) = read_bar_file(&path, region)?;

        for error in &errors {
            warn!(file = %path.display(), line = error.line, "skipped bar row: {}", error.reason);
        }

        Ok(bars
            .into_iter()
            .filter(|bar| bar.symbol == symbol && bar.date >= since)
            .collect())
    }
}

/// Holdings collaborator backed by `holdings_{region}.csv` files.
pub struct CsvHoldings {
    base_path: PathBuf,
}

impl CsvHoldings {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn holdings_path(&self, region: Region) -> PathBuf {
        self.base_path.join(format!("holdings_{region}.csv"))
    }
}

impl HoldingsPort for CsvHoldings {
    fn fetch_holdings(&self, region: Region) -> Result<HoldingsSnapshot, EngineError> {
        let path = self.holdings_path(region);
        let mut reader =
            csv::Reader::from_path(&path).map_err(|e| EngineError::UpstreamUnavailable {
                reason: format!("failed to open {}: {e}", path.display()),
            })?;

        let mut lots = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let line = index + 2;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(file = %path.display(), line, "skipped holdings row: {e}");
                    continue;
                }
            };

            match lot_from_record(&record, region) {
                Ok(lot) => lots.push(lot),
                Err(reason) => {
                    warn!(file = %path.display(), line, "skipped holdings row: {reason}");
                }
            }
        }

        Ok(HoldingsSnapshot::new(region, lots))
    }
}

fn lot_from_record(record: &csv::StringRecord, region: Region) -> Result<HoldingLot, String> {
    let symbol = required_field(record, 0, "symbol")?;
    let quantity: f64 = required_field(record, 1, "quantity")?
        .parse()
        .map_err(|e| format!("invalid quantity value: {e}"))?;
    if !quantity.is_finite() || quantity < 0.0 {
        return Err("quantity must be a non-negative number".into());
    }

    Ok(HoldingLot {
        symbol,
        region,
        quantity,
        stock_type: required_field(record, 2, "stock_type").unwrap_or_else(|_| "Unknown".into()),
        rating: required_field(record, 3, "rating").unwrap_or_else(|_| "Unrated".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_bars_with_optional_fields_blank() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bars.csv",
            "symbol,date,open,high,low,close,volume,adjusted_close\n\
             AAPL,2024-01-15,182.2,184.3,181.0,183.6,52000000,183.6\n\
             AAPL,2024-01-16,,,,185.1,,\n",
        );

        let (bars, errors) = read_bar_file(&path, Region::Usd).unwrap();
        assert!(errors.is_empty());
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, Some(182.2));
        assert_eq!(bars[1].open, None);
        assert_eq!(bars[1].close, 185.1);
    }

    #[test]
    fn malformed_rows_are_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bars.csv",
            "symbol,date,open,high,low,close,volume,adjusted_close\n\
             AAPL,2024-01-15,,,,183.6,,\n\
             AAPL,not-a-date,,,,184.0,,\n\
             AAPL,2024-01-17,,,,,,\n\
             AAPL,2024-01-18,,,,186.0,,\n",
        );

        let (bars, errors) = read_bar_file(&path, Region::Usd).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[1].line, 4);
        assert!(errors[1].reason.contains("close"));
    }

    #[test]
    fn rows_sorted_by_symbol_then_date() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bars.csv",
            "symbol,date,open,high,low,close,volume,adjusted_close\n\
             MSFT,2024-01-16,,,,402.0,,\n\
             AAPL,2024-01-16,,,,185.0,,\n\
             AAPL,2024-01-15,,,,183.6,,\n",
        );

        let (bars, _) = read_bar_file(&path, Region::Usd).unwrap();
        let keys: Vec<(String, NaiveDate)> =
            bars.iter().map(|b| (b.symbol.clone(), b.date)).collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL".to_string(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
                ("AAPL".to_string(), NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()),
                ("MSFT".to_string(), NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()),
            ]
        );
    }

    #[test]
    fn fetch_bars_filters_symbol_and_since() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "AAPL_USD.csv",
            "symbol,date,open,high,low,close,volume,adjusted_close\n\
             AAPL,2024-01-15,,,,183.6,,\n\
             AAPL,2024-01-16,,,,185.1,,\n\
             AAPL,2024-01-17,,,,186.2,,\n",
        );

        let adapter = CsvMarketData::new(dir.path().to_path_buf());
        let bars = adapter
            .fetch_bars(
                "AAPL",
                Region::Usd,
                NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
            )
            .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 185.1);
    }

    #[test]
    fn missing_bar_file_is_upstream_unavailable() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvMarketData::new(dir.path().to_path_buf());
        let result = adapter.fetch_bars(
            "XYZ",
            Region::Usd,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(matches!(
            result,
            Err(EngineError::UpstreamUnavailable { .. })
        ));
    }

    #[test]
    fn reads_holdings_for_region() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "holdings_CAD.csv",
            "symbol,quantity,stock_type,rating\n\
             SHOP,12.5,Common,A\n\
             RY,40,Common,AA\n",
        );

        let adapter = CsvHoldings::new(dir.path().to_path_buf());
        let snapshot = adapter.fetch_holdings(Region::Cad).unwrap();

        assert_eq!(snapshot.region, Region::Cad);
        assert_eq!(snapshot.lots.len(), 2);
        assert_eq!(snapshot.lots[0].symbol, "SHOP");
        assert_eq!(snapshot.lots[0].quantity, 12.5);
        assert_eq!(snapshot.lots[1].rating, "AA");
    }

    #[test]
    fn negative_quantity_row_skipped() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "holdings_USD.csv",
            "symbol,quantity,stock_type,rating\n\
             AAPL,-5,Common,A\n\
             MSFT,10,Common,AAA\n",
        );

        let adapter = CsvHoldings::new(dir.path().to_path_buf());
        let snapshot = adapter.fetch_holdings(Region::Usd).unwrap();
        assert_eq!(snapshot.lots.len(), 1);
        assert_eq!(snapshot.lots[0].symbol, "MSFT");
    }
}
