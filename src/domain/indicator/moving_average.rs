//! Simple moving averages over trailing available bars.
//!
//! ma50[i] = mean(close[i-49..=i]) once 50 bars exist, else absent; ma200
//! analogous. Windows count available bars, not calendar days, so gaps in
//! trading days shift the window rather than being filled.

use crate::domain::bar::StoredBar;
use crate::domain::indicator::MovingAverageRecord;

pub const FAST_WINDOW: usize = 50;
pub const SLOW_WINDOW: usize = 200;

pub fn compute(bars: &[StoredBar]) -> Vec<MovingAverageRecord> {
    bars.iter()
        .enumerate()
        .map(|(i, sb)| MovingAverageRecord {
            symbol: sb.bar.symbol.clone(),
            region: sb.bar.region,
            date: sb.bar.date,
            ma50: window_mean(bars, i, FAST_WINDOW),
            ma200: window_mean(bars, i, SLOW_WINDOW),
            source_bar_id: sb.id,
        })
        .collect()
}

/// Mean of the `window` closes ending at index `i` inclusive.
///
/// Summed left-to-right over the window on every call so that a full
/// recompute and an incremental extension produce bit-identical values.
fn window_mean(bars: &[StoredBar], i: usize, window: usize) -> Option<f64> {
    if i + 1 < window {
        return None;
    }
    let sum: f64 = bars[i + 1 - window..=i].iter().map(|sb| sb.bar.close).sum();
    Some(sum / window as f64)
}
