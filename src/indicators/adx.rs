// =============================================================================
// Average Directional Index (ADX) with directional components
// =============================================================================
//
// ADX quantifies trend strength regardless of direction; +DI / -DI carry the
// direction itself. The regime detector needs all three, so this module
// returns them together.
//
//   1. Per bar: +DM, -DM, and True Range.
//   2. Wilder-smooth all three over `period`.
//   3. +DI = 100 * smoothed(+DM) / smoothed(TR), -DI analogous.
//   4. DX = 100 * |+DI - -DI| / (+DI + -DI).
//   5. ADX = Wilder-smoothed mean of DX, seeded with the SMA of the first
//      `period` DX values.
//
// Warm-up: `2 * period` bars (plus the first bar that has no predecessor),
// so `2 * period + 1` candles produce the first ADX.

use crate::market_data::Candle;

/// ADX and the directional index pair it was derived from, at the last bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalIndex {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Compute the most recent [`DirectionalIndex`] over `candles`.
///
/// Returns `None` when `period == 0`, fewer than `2 * period + 1` candles are
/// supplied, the smoothed true range collapses to zero, or any intermediate
/// value is non-finite.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<DirectionalIndex> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let transitions = candles.len() - 1;
    let mut plus_dm = Vec::with_capacity(transitions);
    let mut minus_dm = Vec::with_capacity(transitions);
    let mut true_range = Vec::with_capacity(transitions);

    for w in candles.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        true_range.push(tr);
    }

    let period_f = period as f64;
    let mut smooth_plus: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = true_range[..period].iter().sum();

    let mut dx_values = Vec::with_capacity(transitions - period + 1);
    let (mut plus_di, mut minus_di, dx) = directional(smooth_plus, smooth_minus, smooth_tr)?;
    dx_values.push(dx);

    for i in period..transitions {
        smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[i];
        smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + true_range[i];

        let (p, m, dx) = directional(smooth_plus, smooth_minus, smooth_tr)?;
        plus_di = p;
        minus_di = m;
        dx_values.push(dx);
    }

    if dx_values.len() < period {
        return None;
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
    }

    adx.is_finite().then_some(DirectionalIndex {
        adx,
        plus_di,
        minus_di,
    })
}

/// (+DI, -DI, DX) from the smoothed components.
fn directional(smooth_plus: f64, smooth_minus: f64, smooth_tr: f64) -> Option<(f64, f64, f64)> {
    if smooth_tr == 0.0 {
        return None;
    }
    let plus_di = 100.0 * smooth_plus / smooth_tr;
    let minus_di = 100.0 * smooth_minus / smooth_tr;

    let di_sum = plus_di + minus_di;
    // Both zero: no directional movement at all, DX reads 0.
    let dx = if di_sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / di_sum
    };

    (plus_di.is_finite() && minus_di.is_finite() && dx.is_finite())
        .then_some((plus_di, minus_di, dx))
}
