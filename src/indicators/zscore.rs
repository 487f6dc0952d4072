// =============================================================================
// Z-score of the latest sample
// =============================================================================
//
// How many sample standard deviations the most recent value sits away from
// the mean of its trailing window. Warm-up: `period - 1` samples.

use super::{sample_std_dev, sma};

/// Z-score of the last element of `values` against the trailing `period`
/// window (the window includes that element).
///
/// Returns `None` for short input, `period < 2`, or a flat window (zero
/// standard deviation leaves the score undefined).
pub fn zscore(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma(values, period)?;
    let sigma = sample_std_dev(values, period)?;
    if sigma == 0.0 {
        return None;
    }
    let last = *values.last()?;
    let z = (last - mean) / sigma;
    z.is_finite().then_some(z)
}
