// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// VWAP = sum(typical_price * volume) / sum(volume) over the supplied window.
// The caller chooses the window (a session, a day, a rolling slice); no
// warm-up beyond one bar with volume.

use crate::market_data::Candle;

/// VWAP over the whole candle slice.
///
/// Returns `None` for an empty slice, zero total volume, or a non-finite
/// result.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let mut weighted_sum = 0.0;
    let mut volume_sum = 0.0;
    for candle in candles {
        weighted_sum += candle.typical_price() * candle.volume;
        volume_sum += candle.volume;
    }
    if volume_sum <= 0.0 {
        return None;
    }
    let value = weighted_sum / volume_sum;
    value.is_finite().then_some(value)
}
