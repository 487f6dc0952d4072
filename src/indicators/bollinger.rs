// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period), upper/lower = middle +/- num_std * sigma where
// sigma is the SAMPLE standard deviation (Bessel's correction, n - 1) of the
// trailing window. Bandwidth is the normalised band spread
// (upper - lower) / middle, reported as a fraction (0.02 = 2 %).
//
// Warm-up: `period - 1` samples.

use super::{sample_std_dev, sma};

/// Bands computed at the most recent sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle, as a fraction of the middle band.
    pub bandwidth: f64,
}

/// Calculate Bollinger Bands over the trailing `period` closes.
///
/// Returns `None` when the window is short, `period < 2`, the middle band is
/// zero (bandwidth undefined), or any component is non-finite.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    num_std: f64,
) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    if middle == 0.0 {
        return None;
    }
    let sigma = sample_std_dev(closes, period)?;

    let upper = middle + num_std * sigma;
    let lower = middle - num_std * sigma;
    let bandwidth = (upper - lower) / middle;

    let all_finite =
        upper.is_finite() && lower.is_finite() && bandwidth.is_finite();
    all_finite.then_some(BollingerBands {
        upper,
        middle,
        lower,
        bandwidth,
    })
}
