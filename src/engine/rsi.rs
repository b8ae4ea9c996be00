//! # engine::rsi
//!
//! **RSI Calculator**: Wilder's smoothed 14-period RSI, one price at a time.
//!
//! ```text
//! prices 1..14   → buffered, no value
//! price 15       → seed: avg_gain / avg_loss = mean of the 14 deltas → first RSI
//! price 16..     → smooth: avg = (avg * 13 + x) / 14                 → RSI
//! ```
//!
//! Everything here is synchronous and side-effect free apart from the
//! `&mut PriceWindow` it is handed.  Given the same prices in the same order it
//! always produces the same values.
//!
//! ## Zero-division conventions
//! * `avg_loss == 0 && avg_gain > 0` → `100.0`
//! * `avg_loss == 0 && avg_gain == 0` → `50.0` (flat price)

use crate::engine::window::{PriceWindow, WilderAverages};

/// Look-back period of the indicator.
pub const RSI_PERIOD: usize = 14;

/// Prices needed before the first value: one more than the number of deltas.
pub const WINDOW_CAPACITY: usize = RSI_PERIOD + 1;

/// Value reported when price has not moved at all.
pub const NEUTRAL_RSI: f64 = 50.0;

const PERIOD: f64 = RSI_PERIOD as f64;

// ─── Incremental Update ───────────────────────────────────────────────────────

/// Feed one price into `window`.
///
/// Returns `Some(rsi)` once the window holds 15 prices (on that 15th price and
/// on every price after), `None` while still warming up.
pub fn advance(window: &mut PriceWindow, price: f64) -> Option<f64> {
    match window.averages() {
        None => {
            window.push(price);
            if window.len() < WINDOW_CAPACITY {
                return None;
            }
            let seeded = seed_averages(window.history().iter().copied());
            window.set_averages(seeded);
            Some(rsi_from_averages(seeded))
        }
        Some(prev) => {
            let delta = window.last_price().map_or(0.0, |last| price - last);
            let smoothed = smooth(prev, delta);
            window.push(price);
            window.set_averages(smoothed);
            Some(rsi_from_averages(smoothed))
        }
    }
}

// ─── Building Blocks ──────────────────────────────────────────────────────────

/// Simple mean of gains and losses over the consecutive deltas of `prices`.
pub fn seed_averages<I>(prices: I) -> WilderAverages
where
    I: IntoIterator<Item = f64>,
{
    let mut prev: Option<f64> = None;
    let mut avg = WilderAverages { gain: 0.0, loss: 0.0 };

    // each term is divided before summing so prices near f64::MAX stay finite
    for price in prices {
        if let Some(p) = prev {
            let (gain, loss) = split_delta(price - p);
            avg.gain += gain / PERIOD;
            avg.loss += loss / PERIOD;
        }
        prev = Some(price);
    }

    avg
}

/// One step of Wilder smoothing: `(avg * 13 + x) / 14`.
///
/// Written as `avg + (x - avg) / 14`, which cannot overflow for finite inputs.
#[inline]
pub fn smooth(prev: WilderAverages, delta: f64) -> WilderAverages {
    let (gain, loss) = split_delta(delta);
    WilderAverages {
        gain: prev.gain + (gain - prev.gain) / PERIOD,
        loss: prev.loss + (loss - prev.loss) / PERIOD,
    }
}

/// `RSI = 100 - 100 / (1 + avg_gain / avg_loss)`, clamped to `[0, 100]`.
///
/// Non-finite averages never yield NaN: an unbounded gain ratio reads as
/// `100.0`, anything undefined as neutral.
pub fn rsi_from_averages(avg: WilderAverages) -> f64 {
    if avg.gain.is_nan() || avg.loss.is_nan() {
        return NEUTRAL_RSI;
    }
    if avg.loss > 0.0 {
        let rs = avg.gain / avg.loss;
        if rs.is_nan() {
            return NEUTRAL_RSI;
        }
        if rs.is_infinite() {
            return 100.0;
        }
        (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
    } else if avg.gain > 0.0 {
        100.0
    } else {
        NEUTRAL_RSI
    }
}

#[inline]
fn split_delta(delta: f64) -> (f64, f64) {
    (delta.max(0.0), (-delta).max(0.0))
}

// ─── Batch Reference ──────────────────────────────────────────────────────────

/// Whole-series Wilder RSI over a slice, one value per price from index 14 on.
///
/// Useful for replaying a recorded price list or checking the incremental
/// path against a straight-line computation.
pub fn wilder_series(prices: &[f64]) -> Vec<f64> {
    if prices.len() < WINDOW_CAPACITY {
        return Vec::new();
    }

    let mut avg = seed_averages(prices[..WINDOW_CAPACITY].iter().copied());
    let mut out = Vec::with_capacity(prices.len() - RSI_PERIOD);
    out.push(rsi_from_averages(avg));

    for pair in prices[RSI_PERIOD..].windows(2) {
        avg = smooth(avg, pair[1] - pair[0]);
        out.push(rsi_from_averages(avg));
    }

    out
}

// ─── Tests ────────────────────────────────────────────────────────────────────
