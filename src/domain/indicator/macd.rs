//! MACD: fast and slow EMAs of the close, and their difference.
//!
//! k = 2/(n+1), seed with the simple mean of the first n closes at index
//! n-1, then EMA[i] = C[i]*k + EMA[i-1]*(1-k). Values before the seed index
//! are absent, not zero. histogram = fast_ema - slow_ema.

use crate::domain::bar::StoredBar;
use crate::domain::indicator::{closes, MacdRecord};

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;

/// Recurrence state carried across incremental runs: the EMAs as of the
/// last computed bar. Only available once the slow EMA has seeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdSeed {
    pub fast_ema: f64,
    pub slow_ema: f64,
}

pub fn smoothing(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// EMA over a close series, seeded from the simple average of the first
/// `period` values. Absent during warmup.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let k = smoothing(period);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            sum += value;
            out.push(None);
        } else if i == period - 1 {
            sum += value;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema = value * k + ema * (1.0 - k);
            out.push(Some(ema));
        }
    }

    out
}

pub fn compute(bars: &[StoredBar]) -> Vec<MacdRecord> {
    let close_values = closes(bars);
    let fast = ema_series(&close_values, FAST_PERIOD);
    let slow = ema_series(&close_values, SLOW_PERIOD);

    bars.iter()
        .enumerate()
        .map(|(i, sb)| {
            let histogram = match (fast[i], slow[i]) {
                (Some(f), Some(s)) => Some(f - s),
                _ => None,
            };
            MacdRecord {
                symbol: sb.bar.symbol.clone(),
                region: sb.bar.region,
                date: sb.bar.date,
                fast_ema: fast[i],
                slow_ema: slow[i],
                histogram,
                source_bar_id: sb.id,
            }
        })
        .collect()
}

/// Continue the recurrences from `seed` over bars appended after the last
/// computed one. Every produced record is past both warmups.
pub fn extend(seed: MacdSeed, bars: &[StoredBar]) -> (Vec<MacdRecord>, MacdSeed) {
    let k_fast = smoothing(FAST_PERIOD);
    let k_slow = smoothing(SLOW_PERIOD);
    let mut fast = seed.fast_ema;
    let mut slow = seed.slow_ema;

    let records = bars
        .iter()
        .map(|sb| {
            fast = sb.bar.close * k_fast + fast * (1.0 - k_fast);
            slow = sb.bar.close * k_slow + slow * (1.0 - k_slow);
            MacdRecord {
                symbol: sb.bar.symbol.clone(),
                region: sb.bar.region,
                date: sb.bar.date,
                fast_ema: Some(fast),
                slow_ema: Some(slow),
                histogram: Some(fast - slow),
                source_bar_id: sb.id,
            }
        })
        .collect();

    (
        records,
        MacdSeed {
            fast_ema: fast,
            slow_ema: slow,
        },
    )
}

/// Recurrence state as of the last record, if the slow EMA has seeded.
pub fn seed_from_last(records: &[MacdRecord]) -> Option<MacdSeed> {
    let last = records.last()?;
    match (last.fast_ema, last.slow_ema) {
        (Some(fast_ema), Some(slow_ema)) => Some(MacdSeed { fast_ema, slow_ema }),
        _ => None,
    }
}
