// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Recursive smoothing with alpha = 2 / (period + 1), seeded with the simple
// average of the first `period` values. Warm-up: `period - 1` samples; the
// output series starts at input index `period - 1`.

/// Compute the EMA series for `values` with the given look-back `period`.
///
/// Returns an empty vector when `period == 0` or the input is shorter than
/// `period`. A non-finite intermediate value truncates the series at that
/// point; consumers must not trust anything past a broken sample.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let seed = values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &value in &values[period..] {
        let ema = alpha * value + (1.0 - alpha) * prev;
        if !ema.is_finite() {
            break;
        }
        out.push(ema);
        prev = ema;
    }
    out
}
