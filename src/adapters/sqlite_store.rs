//! SQLite store adapter for price bars and indicator tables.
//!
//! Four data tables (`price_bars`, `moving_average_data`, `macd_data`,
//! `rsi_data`), each uniquely keyed by (symbol, region, date), plus the
//! `series_state` bookkeeping table driving the recompute policy. All
//! writes run in IMMEDIATE transactions so concurrent upserts to the same
//! key serialize with last-writer-wins.

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::time::Duration;

use crate::domain::bar::{PriceBar, StoredBar, UpsertKind, UpsertOutcome};
use crate::domain::error::EngineError;
use crate::domain::indicator::rsi::{RsiState, WilderAverages};
use crate::domain::indicator::{MacdRecord, MovingAverageRecord, RsiRecord};
use crate::domain::range::DateRange;
use crate::domain::recompute::{IndicatorWrite, SeriesState};
use crate::domain::region::Region;
use crate::ports::config_port::ConfigPort;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::price_store_port::PriceStorePort;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| EngineError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), EngineError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS price_bars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                region TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL NOT NULL,
                volume INTEGER,
                adjusted_close REAL,
                UNIQUE (symbol, region, date)
            );
            CREATE INDEX IF NOT EXISTS idx_price_bars_series ON price_bars(symbol, region);
            CREATE TABLE IF NOT EXISTS moving_average_data (
                symbol TEXT NOT NULL,
                region TEXT NOT NULL,
                date TEXT NOT NULL,
                ma50 REAL,
                ma200 REAL,
                source_bar_id INTEGER NOT NULL,
                PRIMARY KEY (symbol, region, date)
            );
            CREATE TABLE IF NOT EXISTS macd_data (
                symbol TEXT NOT NULL,
                region TEXT NOT NULL,
                date TEXT NOT NULL,
                fast_ema REAL,
                slow_ema REAL,
                histogram REAL,
                source_bar_id INTEGER NOT NULL,
                PRIMARY KEY (symbol, region, date)
            );
            CREATE TABLE IF NOT EXISTS rsi_data (
                symbol TEXT NOT NULL,
                region TEXT NOT NULL,
                date TEXT NOT NULL,
                rsi9 REAL,
                rsi14 REAL,
                rsi21 REAL,
                source_bar_id INTEGER NOT NULL,
                PRIMARY KEY (symbol, region, date)
            );
            CREATE TABLE IF NOT EXISTS series_state (
                symbol TEXT NOT NULL,
                region TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                needs_full_recompute INTEGER NOT NULL DEFAULT 1,
                last_computed_date TEXT,
                avg_gain_9 REAL,
                avg_loss_9 REAL,
                avg_gain_14 REAL,
                avg_loss_14 REAL,
                avg_gain_21 REAL,
                avg_loss_21 REAL,
                prev_close REAL,
                PRIMARY KEY (symbol, region)
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, EngineError> {
        self.pool.get().map_err(|e: r2d2::Error| EngineError::Database {
            reason: e.to_string(),
        })
    }
}

fn query_err(e: rusqlite::Error) -> EngineError {
    EngineError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| EngineError::Database {
        reason: format!("corrupt stored date {value}: {e}"),
    })
}

fn bar_from_row(
    row: &rusqlite::Row<'_>,
    region: Region,
) -> rusqlite::Result<(i64, String, PriceBar)> {
    let id: i64 = row.get(0)?;
    let date_str: String = row.get(2)?;
    let bar = PriceBar {
        symbol: row.get(1)?,
        region,
        // Placeholder; the caller replaces it after parsing date_str.
        date: NaiveDate::MIN,
        open: row.get(3)?,
        high: row.get(4)?,
        low: row.get(5)?,
        close: row.get(6)?,
        volume: row.get(7)?,
        adjusted_close: row.get(8)?,
    };
    Ok((id, date_str, bar))
}

impl SqliteStore {
    fn select_bars(
        &self,
        query: &str,
        params: &[&dyn rusqlite::ToSql],
        region: Region,
    ) -> Result<Vec<StoredBar>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(params, |row| bar_from_row(row, region))
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            let (id, date_str, mut bar) = row.map_err(query_err)?;
            bar.date = parse_stored_date(&date_str)?;
            bars.push(StoredBar { id, bar });
        }
        Ok(bars)
    }
}

impl PriceStorePort for SqliteStore {
    fn upsert_bar(&self, bar: &PriceBar) -> Result<UpsertOutcome, EngineError> {
        bar.validate()?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let date_str = format_date(bar.date);

        let existing: Option<(Option<f64>, Option<f64>, Option<f64>, f64, Option<i64>, Option<f64>)> = tx
            .query_row(
                "SELECT open, high, low, close, volume, adjusted_close
                 FROM price_bars WHERE symbol = ?1 AND region = ?2 AND date = ?3",
                params![bar.symbol, bar.region.as_str(), date_str],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(query_err)?;

        let latest: Option<String> = tx
            .query_row(
                "SELECT MAX(date) FROM price_bars WHERE symbol = ?1 AND region = ?2",
                params![bar.symbol, bar.region.as_str()],
                |row| row.get(0),
            )
            .map_err(query_err)?;

        let (kind, backfill) = match &existing {
            None => {
                let appended = match &latest {
                    Some(latest_str) => date_str.as_str() > latest_str.as_str(),
                    None => true,
                };
                (UpsertKind::Inserted, !appended)
            }
            Some((open, high, low, close, volume, adjusted_close)) => {
                let unchanged = *open == bar.open
                    && *high == bar.high
                    && *low == bar.low
                    && *close == bar.close
                    && *volume == bar.volume
                    && *adjusted_close == bar.adjusted_close;
                if unchanged {
                    (UpsertKind::Unchanged, false)
                } else {
                    // Rewriting an already-stored date changes history.
                    (UpsertKind::Updated, true)
                }
            }
        };

        if kind == UpsertKind::Unchanged {
            tx.commit().map_err(query_err)?;
            return Ok(UpsertOutcome {
                kind,
                backfill: false,
            });
        }

        tx.execute(
            "INSERT INTO price_bars
                 (symbol, region, date, open, high, low, close, volume, adjusted_close)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (symbol, region, date) DO UPDATE SET
                 open = excluded.open,
                 high = excluded.high,
                 low = excluded.low,
                 close = excluded.close,
                 volume = excluded.volume,
                 adjusted_close = excluded.adjusted_close",
            params![
                bar.symbol,
                bar.region.as_str(),
                date_str,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                bar.adjusted_close
            ],
        )
        .map_err(query_err)?;

        tx.execute(
            "INSERT INTO series_state (symbol, region, revision, needs_full_recompute)
             VALUES (?1, ?2, 1, 1)
             ON CONFLICT (symbol, region) DO UPDATE SET
                 revision = revision + 1,
                 needs_full_recompute = needs_full_recompute OR ?3",
            params![bar.symbol, bar.region.as_str(), backfill],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;

        Ok(UpsertOutcome { kind, backfill })
    }

    fn bars_in_range(
        &self,
        symbol: &str,
        region: Region,
        range: &DateRange,
    ) -> Result<Vec<StoredBar>, EngineError> {
        self.select_bars(
            "SELECT id, symbol, date, open, high, low, close, volume, adjusted_close
             FROM price_bars
             WHERE symbol = ?1 AND region = ?2 AND date >= ?3 AND date <= ?4
             ORDER BY date ASC",
            &[
                &symbol,
                &region.as_str(),
                &format_date(range.start),
                &format_date(range.end),
            ],
            region,
        )
    }

    fn all_bars(&self, symbol: &str, region: Region) -> Result<Vec<StoredBar>, EngineError> {
        self.select_bars(
            "SELECT id, symbol, date, open, high, low, close, volume, adjusted_close
             FROM price_bars
             WHERE symbol = ?1 AND region = ?2
             ORDER BY date ASC",
            &[&symbol, &region.as_str()],
            region,
        )
    }

    fn close_on(
        &self,
        symbol: &str,
        region: Region,
        date: NaiveDate,
    ) -> Result<Option<f64>, EngineError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT close FROM price_bars WHERE symbol = ?1 AND region = ?2 AND date = ?3",
            params![symbol, region.as_str(), format_date(date)],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)
    }

    fn data_range(
        &self,
        symbol: &str,
        region: Region,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, EngineError> {
        let conn = self.conn()?;

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*)
                 FROM price_bars WHERE symbol = ?1 AND region = ?2",
                params![symbol, region.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let min = parse_stored_date(&min_str)?;
                let max = parse_stored_date(&max_str)?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn list_symbols(&self, region: Region) -> Result<Vec<String>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM price_bars WHERE region = ?1 ORDER BY symbol")
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![region.as_str()], |row| row.get(0))
            .map_err(query_err)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_err)?);
        }
        Ok(symbols)
    }

    fn delete_bar(
        &self,
        symbol: &str,
        region: Region,
        date: NaiveDate,
    ) -> Result<bool, EngineError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let deleted = tx
            .execute(
                "DELETE FROM price_bars WHERE symbol = ?1 AND region = ?2 AND date = ?3",
                params![symbol, region.as_str(), format_date(date)],
            )
            .map_err(query_err)?;

        if deleted > 0 {
            tx.execute(
                "UPDATE series_state SET revision = revision + 1, needs_full_recompute = 1
                 WHERE symbol = ?1 AND region = ?2",
                params![symbol, region.as_str()],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(deleted > 0)
    }
}

impl IndicatorStorePort for SqliteStore {
    fn series_state(
        &self,
        symbol: &str,
        region: Region,
    ) -> Result<Option<SeriesState>, EngineError> {
        let conn = self.conn()?;

        let row: Option<(
            i64,
            bool,
            Option<String>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        )> = conn
            .query_row(
                "SELECT revision, needs_full_recompute, last_computed_date,
                        avg_gain_9, avg_loss_9, avg_gain_14, avg_loss_14,
                        avg_gain_21, avg_loss_21, prev_close
                 FROM series_state WHERE symbol = ?1 AND region = ?2",
                params![symbol, region.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )
            .optional()
            .map_err(query_err)?;

        let Some((revision, needs_full, last_str, g9, l9, g14, l14, g21, l21, prev_close)) = row
        else {
            return Ok(None);
        };

        let last_computed_date = match last_str {
            Some(value) => Some(parse_stored_date(&value)?),
            None => None,
        };

        let rsi_state = match (g9, l9, g14, l14, g21, l21, prev_close) {
            (Some(g9), Some(l9), Some(g14), Some(l14), Some(g21), Some(l21), Some(prev_close)) => {
                Some(RsiState {
                    p9: WilderAverages {
                        avg_gain: g9,
                        avg_loss: l9,
                    },
                    p14: WilderAverages {
                        avg_gain: g14,
                        avg_loss: l14,
                    },
                    p21: WilderAverages {
                        avg_gain: g21,
                        avg_loss: l21,
                    },
                    prev_close,
                })
            }
            _ => None,
        };

        Ok(Some(SeriesState {
            revision,
            needs_full_recompute: needs_full,
            last_computed_date,
            rsi_state,
        }))
    }

    fn last_macd(&self, symbol: &str, region: Region) -> Result<Option<MacdRecord>, EngineError> {
        let rows = self.macd_rows(symbol, region, 1)?;
        Ok(rows.into_iter().next_back())
    }

    fn replace_indicators(
        &self,
        symbol: &str,
        region: Region,
        write: &IndicatorWrite,
    ) -> Result<(), EngineError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let revision: i64 = tx
            .query_row(
                "SELECT revision FROM series_state WHERE symbol = ?1 AND region = ?2",
                params![symbol, region.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?
            .unwrap_or(0);

        if revision != write.expected_revision {
            return Err(EngineError::RecomputeConflict {
                symbol: symbol.to_string(),
                region: region.to_string(),
                reason: format!(
                    "bars changed during recompute (revision {} -> {revision})",
                    write.expected_revision
                ),
            });
        }

        if write.full {
            for table in ["moving_average_data", "macd_data", "rsi_data"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE symbol = ?1 AND region = ?2"),
                    params![symbol, region.as_str()],
                )
                .map_err(query_err)?;
            }
        }

        for record in &write.rows.moving_averages {
            tx.execute(
                "INSERT OR REPLACE INTO moving_average_data
                     (symbol, region, date, ma50, ma200, source_bar_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.symbol,
                    record.region.as_str(),
                    format_date(record.date),
                    record.ma50,
                    record.ma200,
                    record.source_bar_id
                ],
            )
            .map_err(query_err)?;
        }

        for record in &write.rows.macd {
            tx.execute(
                "INSERT OR REPLACE INTO macd_data
                     (symbol, region, date, fast_ema, slow_ema, histogram, source_bar_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.symbol,
                    record.region.as_str(),
                    format_date(record.date),
                    record.fast_ema,
                    record.slow_ema,
                    record.histogram,
                    record.source_bar_id
                ],
            )
            .map_err(query_err)?;
        }

        for record in &write.rows.rsi {
            tx.execute(
                "INSERT OR REPLACE INTO rsi_data
                     (symbol, region, date, rsi9, rsi14, rsi21, source_bar_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.symbol,
                    record.region.as_str(),
                    format_date(record.date),
                    record.rsi9,
                    record.rsi14,
                    record.rsi21,
                    record.source_bar_id
                ],
            )
            .map_err(query_err)?;
        }

        let (g9, l9, g14, l14, g21, l21, prev_close) = match &write.rsi_state {
            Some(state) => (
                Some(state.p9.avg_gain),
                Some(state.p9.avg_loss),
                Some(state.p14.avg_gain),
                Some(state.p14.avg_loss),
                Some(state.p21.avg_gain),
                Some(state.p21.avg_loss),
                Some(state.prev_close),
            ),
            None => (None, None, None, None, None, None, None),
        };

        tx.execute(
            "INSERT INTO series_state (symbol, region, revision, needs_full_recompute,
                                       last_computed_date, avg_gain_9, avg_loss_9,
                                       avg_gain_14, avg_loss_14, avg_gain_21, avg_loss_21,
                                       prev_close)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (symbol, region) DO UPDATE SET
                 needs_full_recompute = 0,
                 last_computed_date = excluded.last_computed_date,
                 avg_gain_9 = excluded.avg_gain_9,
                 avg_loss_9 = excluded.avg_loss_9,
                 avg_gain_14 = excluded.avg_gain_14,
                 avg_loss_14 = excluded.avg_loss_14,
                 avg_gain_21 = excluded.avg_gain_21,
                 avg_loss_21 = excluded.avg_loss_21,
                 prev_close = excluded.prev_close",
            params![
                symbol,
                region.as_str(),
                write.expected_revision,
                format_date(write.last_computed_date),
                g9,
                l9,
                g14,
                l14,
                g21,
                l21,
                prev_close
            ],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn moving_averages(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<MovingAverageRecord>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, ma50, ma200, source_bar_id
                 FROM moving_average_data
                 WHERE symbol = ?1 AND region = ?2
                 ORDER BY date DESC LIMIT ?3",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, region.as_str(), limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (date_str, ma50, ma200, source_bar_id) = row.map_err(query_err)?;
            records.push(MovingAverageRecord {
                symbol: symbol.to_string(),
                region,
                date: parse_stored_date(&date_str)?,
                ma50,
                ma200,
                source_bar_id,
            });
        }
        records.reverse();
        Ok(records)
    }

    fn macd(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<MacdRecord>, EngineError> {
        self.macd_rows(symbol, region, limit)
    }

    fn rsi(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<RsiRecord>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, rsi9, rsi14, rsi21, source_bar_id
                 FROM rsi_data
                 WHERE symbol = ?1 AND region = ?2
                 ORDER BY date DESC LIMIT ?3",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, region.as_str(), limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (date_str, rsi9, rsi14, rsi21, source_bar_id) = row.map_err(query_err)?;
            records.push(RsiRecord {
                symbol: symbol.to_string(),
                region,
                date: parse_stored_date(&date_str)?,
                rsi9,
                rsi14,
                rsi21,
                source_bar_id,
            });
        }
        records.reverse();
        Ok(records)
    }
}

impl SqliteStore {
    fn macd_rows(
        &self,
        symbol: &str,
        region: Region,
        limit: usize,
    ) -> Result<Vec<MacdRecord>, EngineError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, fast_ema, slow_ema, histogram, source_bar_id
                 FROM macd_data
                 WHERE symbol = ?1 AND region = ?2
                 ORDER BY date DESC LIMIT ?3",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![symbol, region.as_str(), limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (date_str, fast_ema, slow_ema, histogram, source_bar_id) = row.map_err(query_err)?;
            records.push(MacdRecord {
                symbol: symbol.to_string(),
                region,
                date: parse_stored_date(&date_str)?,
                fast_ema,
                slow_ema,
                histogram,
                source_bar_id,
            });
        }
        records.reverse();
        Ok(records)
    }
}
