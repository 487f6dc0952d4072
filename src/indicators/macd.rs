// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
// MACD line  = EMA(fast) - EMA(slow)          (defaults 12 / 26)
// Signal     = EMA(signal_period) of the line  (default 9)
// Histogram  = MACD line - signal
//
// Warm-up with defaults: the first histogram value corresponds to close index
// `slow + signal_period - 2` (index 33), so 34 closes produce one histogram
// sample.

use super::ema::calculate_ema;

/// Aligned MACD output series. All three vectors share the same length; index
/// 0 corresponds to close index `slow + signal_period - 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    pub fn len(&self) -> usize {
        self.histogram.len()
    }
}

/// Compute MACD line, signal, and histogram series.
///
/// Returns empty series when the input cannot cover the warm-up or the
/// parameters are degenerate (`fast >= slow`, any period zero).
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let empty = MacdSeries {
        line: Vec::new(),
        signal: Vec::new(),
        histogram: Vec::new(),
    };

    if fast == 0 || signal_period == 0 || fast >= slow || closes.len() < slow {
        return empty;
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    if slow_ema.is_empty() {
        return empty;
    }

    // Both EMA series end at the last close; align them from the slow seed.
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .filter_map(|(i, &s)| fast_ema.get(i + offset).map(|&f| f - s))
        .collect();

    let signal = calculate_ema(&line, signal_period);
    if signal.is_empty() {
        return empty;
    }

    // The signal series starts `signal_period - 1` samples into the line.
    let line_tail = &line[signal_period - 1..];
    let histogram: Vec<f64> = line_tail
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| l - s)
        .collect();

    MacdSeries {
        line: line_tail.to_vec(),
        signal,
        histogram,
    }
}

/// MACD with the standard 12 / 26 / 9 parameters.
pub fn calculate_macd_default(closes: &[f64]) -> MacdSeries {
    calculate_macd(closes, 12, 26, 9)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.35).sin() * 5.0).collect()
    }

    #[test]
    fn macd_short_input_is_empty() {
        assert!(calculate_macd_default(&wave(25)).is_empty());
        // 33 closes: line exists but the signal EMA cannot seed.
        assert!(calculate_macd_default(&wave(33)).is_empty());
    }

    #[test]
    fn macd_warm_up_boundary() {
        // 34 closes: exactly one histogram sample with 12/26/9.
        let out = calculate_macd_default(&wave(34));
        assert_eq!(out.len(), 1);

        let out = calculate_macd_default(&wave(60));
        assert_eq!(out.len(), 60 - 33);
    }

    #[test]
    fn macd_degenerate_parameters() {
        let closes = wave(60);
        assert!(calculate_macd(&closes, 26, 12, 9).is_empty());
        assert!(calculate_macd(&closes, 12, 12, 9).is_empty());
        assert!(calculate_macd(&closes, 0, 26, 9).is_empty());
        assert!(calculate_macd(&closes, 12, 26, 0).is_empty());
    }

    #[test]
    fn macd_series_are_aligned() {
        let out = calculate_macd_default(&wave(80));
        assert_eq!(out.line.len(), out.signal.len());
        assert_eq!(out.line.len(), out.histogram.len());
        for i in 0..out.len() {
            assert!((out.histogram[i] - (out.line[i] - out.signal[i])).abs() < 1e-12);
        }
    }

    #[test]
    fn macd_flat_input_is_zero() {
        let out = calculate_macd_default(&vec![100.0; 60]);
        for &h in &out.histogram {
            assert!(h.abs() < 1e-10);
        }
        for &l in &out.line {
            assert!(l.abs() < 1e-10);
        }
    }

    #[test]
    fn macd_rising_prices_produce_positive_line() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let out = calculate_macd_default(&closes);
        // In a steady uptrend the fast EMA sits above the slow EMA.
        assert!(*out.line.last().unwrap() > 0.0);
    }

    #[test]
    fn macd_is_idempotent() {
        let closes = wave(90);
        assert_eq!(calculate_macd_default(&closes), calculate_macd_default(&closes));
    }
}
