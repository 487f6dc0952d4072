// =============================================================================
// Average True Range (ATR), Wilder's smoothing
// =============================================================================
//
// True Range per bar: TR = max(H - L, |H - prevClose|, |L - prevClose|).
// ATR seeds with the simple mean of the first `period` TR values and then
// applies Wilder's recursion: ATR = (prev * (period - 1) + TR) / period.
//
// Warm-up: `period` bars (a TR value needs the previous close, so
// `period + 1` candles produce the first ATR).

use crate::market_data::Candle;

/// Most recent ATR over `candles` (oldest first).
///
/// Returns `None` when `period == 0`, fewer than `period + 1` candles are
/// supplied, or any intermediate value is non-finite.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect();

    let period_f = period as f64;
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period_f;
    if !atr.is_finite() {
        return None;
    }

    for &tr in &true_ranges[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            return None;
        }
    }
    Some(atr)
}

/// ATR expressed as a fraction of the latest close. Comparable across
/// instruments with different price scales; the regime detector keys its
/// volatility rule off this.
pub fn calculate_atr_fraction(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = calculate_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close <= 0.0 {
        return None;
    }
    Some(atr / last_close)
}
