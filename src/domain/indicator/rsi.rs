//! RSI with Wilder's smoothing, at 9, 14 and 21 periods.
//!
//! Per-bar gain/loss against the previous close; the first average is a
//! simple mean over the first n gains/losses, after which
//! avg = (prev_avg * (n-1) + current) / n. RSI = 100 - 100/(1 + RS).
//! avg_loss == 0 yields 100, avg_gain == 0 yields 0. Warmup: the first n
//! bars carry no value (n price changes are needed for the seed).

use crate::domain::bar::StoredBar;
use crate::domain::indicator::{closes, RsiRecord};

pub const FAST_PERIOD: usize = 9;
pub const MID_PERIOD: usize = 14;
pub const SLOW_PERIOD: usize = 21;

/// Smoothed average gain/loss as of the last computed bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WilderAverages {
    pub avg_gain: f64,
    pub avg_loss: f64,
}

/// Recurrence state for all three periods plus the close the next bar's
/// change is measured against. Only available once the slowest period has
/// seeded.
#[derive(Debug, Clone, PartialEq)]
pub struct RsiState {
    pub p9: WilderAverages,
    pub p14: WilderAverages,
    pub p21: WilderAverages,
    pub prev_close: f64,
}

fn rsi_from(avg: WilderAverages) -> f64 {
    if avg.avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg.avg_gain / avg.avg_loss)
    }
}

/// Per-period RSI values and final averages over one close series.
fn wilder_series(close_values: &[f64], period: usize) -> (Vec<Option<f64>>, Option<WilderAverages>) {
    let mut out = vec![None; close_values.len()];
    if close_values.len() <= period {
        return (out, None);
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..close_values.len() {
        let change = close_values[i] - close_values[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i < period {
            avg_gain += gain;
            avg_loss += loss;
        } else if i == period {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
            out[i] = Some(rsi_from(WilderAverages { avg_gain, avg_loss }));
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
            out[i] = Some(rsi_from(WilderAverages { avg_gain, avg_loss }));
        }
    }

    (out, Some(WilderAverages { avg_gain, avg_loss }))
}

/// Full-series computation. The returned state is present once all three
/// periods are past their seed, and feeds [`extend`] on the next
/// incremental run.
pub fn compute(bars: &[StoredBar]) -> (Vec<RsiRecord>, Option<RsiState>) {
    let close_values = closes(bars);
    let (v9, s9) = wilder_series(&close_values, FAST_PERIOD);
    let (v14, s14) = wilder_series(&close_values, MID_PERIOD);
    let (v21, s21) = wilder_series(&close_values, SLOW_PERIOD);

    let records = bars
        .iter()
        .enumerate()
        .map(|(i, sb)| RsiRecord {
            symbol: sb.bar.symbol.clone(),
            region: sb.bar.region,
            date: sb.bar.date,
            rsi9: v9[i],
            rsi14: v14[i],
            rsi21: v21[i],
            source_bar_id: sb.id,
        })
        .collect();

    let state = match (s9, s14, s21, close_values.last()) {
        (Some(p9), Some(p14), Some(p21), Some(&prev_close)) => Some(RsiState {
            p9,
            p14,
            p21,
            prev_close,
        }),
        _ => None,
    };

    (records, state)
}

fn step(avg: WilderAverages, period: usize, gain: f64, loss: f64) -> WilderAverages {
    WilderAverages {
        avg_gain: (avg.avg_gain * (period - 1) as f64 + gain) / period as f64,
        avg_loss: (avg.avg_loss * (period - 1) as f64 + loss) / period as f64,
    }
}

/// Continue the recurrences over bars appended after the last computed one.
pub fn extend(state: &RsiState, bars: &[StoredBar]) -> (Vec<RsiRecord>, RsiState) {
    let mut current = state.clone();

    let records = bars
        .iter()
        .map(|sb| {
            let change = sb.bar.close - current.prev_close;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);

            current = RsiState {
                p9: step(current.p9, FAST_PERIOD, gain, loss),
                p14: step(current.p14, MID_PERIOD, gain, loss),
                p21: step(current.p21, SLOW_PERIOD, gain, loss),
                prev_close: sb.bar.close,
            };

            RsiRecord {
                symbol: sb.bar.symbol.clone(),
                region: sb.bar.region,
                date: sb.bar.date,
                rsi9: Some(rsi_from(current.p9)),
                rsi14: Some(rsi_from(current.p14)),
                rsi21: Some(rsi_from(current.p21)),
                source_bar_id: sb.id,
            }
        })
        .collect();

    (records, current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::testutil::make_bars;
    use proptest::prelude::*;

    #[test]
    fn warmup_lengths_per_period() {
        let prices: Vec<f64> = (0..25).map(|i| 100.0 + (i % 4) as f64).collect();
        let (records, state) = compute(&make_bars(&prices));

        assert!(records[FAST_PERIOD - 1].rsi9.is_none());
        assert!(records[FAST_PERIOD].rsi9.is_some());
        assert!(records[MID_PERIOD - 1].rsi14.is_none());
        assert!(records[MID_PERIOD].rsi14.is_some());
        assert!(records[SLOW_PERIOD - 1].rsi21.is_none());
        assert!(records[SLOW_PERIOD].rsi21.is_some());
        assert!(state.is_some());
    }

    #[test]
    fn monotonic_rise_pins_rsi_at_100() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let (records, _) = compute(&make_bars(&prices));

        for record in &records {
            if let Some(rsi) = record.rsi14 {
                assert!((rsi - 100.0).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn monotonic_fall_pins_rsi_at_zero() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 0.5).collect();
        let (records, _) = compute(&make_bars(&prices));

        for record in &records {
            if let Some(rsi) = record.rsi14 {
                assert!(rsi.abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn flat_series_reads_100() {
        // No losses at all, so avg_loss == 0 wins over avg_gain == 0.
        let prices = vec![100.0; 25];
        let (records, _) = compute(&make_bars(&prices));
        assert!((records[24].rsi14.unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn seed_is_simple_mean_then_wilder() {
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.75, 45.25, 45.5, 45.25,
        ];
        let bars = make_bars(&prices);
        let (records, _) = compute(&bars);

        let mut gains = Vec::new();
        let mut losses = Vec::new();
        for i in 1..prices.len() {
            let change = prices[i] - prices[i - 1];
            gains.push(change.max(0.0));
            losses.push((-change).max(0.0));
        }
        let avg_gain: f64 = gains.iter().sum::<f64>() / FAST_PERIOD as f64;
        let avg_loss: f64 = losses.iter().sum::<f64>() / FAST_PERIOD as f64;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);

        assert!((records[FAST_PERIOD].rsi9.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn state_absent_until_slowest_period_seeds() {
        let prices: Vec<f64> = (0..SLOW_PERIOD).map(|i| 100.0 + i as f64).collect();
        let (_, state) = compute(&make_bars(&prices));
        assert!(state.is_none());
    }

    #[test]
    fn extend_matches_full_recompute_tail() {
        let prices: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 1.3).sin() * 4.0)
            .collect();
        let bars = make_bars(&prices);
        let (full, _) = compute(&bars);

        let split = 30;
        let (_, state) = compute(&bars[..split]);
        let (tail, _) = extend(&state.unwrap(), &bars[split..]);

        assert_eq!(&full[split..], &tail[..]);
    }

    proptest! {
        #[test]
        fn rsi_stays_in_bounds(
            prices in proptest::collection::vec(0.5f64..500.0, 23..60),
        ) {
            let (records, _) = compute(&make_bars(&prices));
            for record in &records {
                for rsi in [record.rsi9, record.rsi14, record.rsi21].into_iter().flatten() {
                    prop_assert!((0.0..=100.0).contains(&rsi), "rsi {rsi} out of bounds");
                }
            }
        }

        #[test]
        fn extend_is_exact_continuation(
            prices in proptest::collection::vec(1.0f64..1000.0, 25..70),
            tail_len in 1usize..10,
        ) {
            let bars = make_bars(&prices);
            let split = prices.len().saturating_sub(tail_len).max(SLOW_PERIOD + 1);
            let (full, _) = compute(&bars);
            let (_, state) = compute(&bars[..split]);
            if let Some(state) = state {
                let (tail, _) = extend(&state, &bars[split..]);
                prop_assert_eq!(&full[split..], &tail[..]);
            }
        }
    }
}
