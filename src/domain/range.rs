//! Date windows for queries and performance rebasing.

use chrono::{Datelike, Days, NaiveDate};
use std::str::FromStr;

use crate::domain::error::EngineError;

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::MalformedDate {
                value: format!("{start}..{end}"),
                reason: "range start is after range end".into(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Named lookback window for performance queries. Selecting a range only
/// moves the rebasing anchor; the underlying store is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    OneWeek,
    OneMonth,
    YearToDate,
    OneYear,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneWeek => "1W",
            TimeRange::OneMonth => "1M",
            TimeRange::YearToDate => "YTD",
            TimeRange::OneYear => "1Y",
        }
    }

    /// First calendar day of the window ending at `as_of`.
    pub fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        match self {
            TimeRange::OneWeek => as_of - Days::new(7),
            TimeRange::OneMonth => as_of - Days::new(30),
            TimeRange::YearToDate => {
                NaiveDate::from_ymd_opt(as_of.year(), 1, 1).expect("january 1st always exists")
            }
            TimeRange::OneYear => as_of - Days::new(365),
        }
    }

    pub fn window(&self, as_of: NaiveDate) -> DateRange {
        DateRange {
            start: self.window_start(as_of),
            end: as_of,
        }
    }
}

impl FromStr for TimeRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1W" => Ok(TimeRange::OneWeek),
            "1M" => Ok(TimeRange::OneMonth),
            "YTD" => Ok(TimeRange::YearToDate),
            "1Y" => Ok(TimeRange::OneYear),
            other => Err(EngineError::MalformedDate {
                value: other.to_string(),
                reason: "expected one of 1W, 1M, YTD, 1Y".into(),
            }),
        }
    }
}

/// Parse a `%Y-%m-%d` date with the engine's error type.
pub fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| EngineError::MalformedDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
