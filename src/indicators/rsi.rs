// =============================================================================
// Relative Strength Index (RSI), Wilder's smoothing
// =============================================================================
//
// Measures the speed and magnitude of recent price changes on a 0..100 scale.
//
//   1. Deltas of consecutive closes, split into gains and losses.
//   2. Seed avg_gain / avg_loss with the simple mean of the first `period`
//      gains / losses.
//   3. Wilder: avg = (prev_avg * (period - 1) + current) / period.
//   4. RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//
// Warm-up: `period` samples (the first RSI corresponds to close index
// `period`).

/// Compute the RSI series for `closes` with the given `period`.
///
/// Returns an empty vector when `period == 0` or fewer than `period + 1`
/// closes are supplied. A non-finite intermediate truncates the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let period_f = period as f64;
    let mut avg_gain = deltas[..period].iter().filter(|&&d| d > 0.0).sum::<f64>() / period_f;
    let mut avg_loss =
        deltas[..period].iter().filter(|&&d| d < 0.0).map(|d| -d).sum::<f64>() / period_f;

    let mut out = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_value(avg_gain, avg_loss) {
        Some(first) => out.push(first),
        None => return Vec::new(),
    }

    for &delta in &deltas[period..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_value(avg_gain, avg_loss) {
            Some(rsi) => out.push(rsi),
            None => break,
        }
    }
    out
}

/// Most recent RSI value, if computable.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Map smoothed averages to an RSI in [0, 100].
///
/// Flat input (both averages zero) reads as 50; loss-free input as 100.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_short_input_is_empty() {
        assert!(calculate_rsi(&[], 14).is_empty());
        let fourteen: Vec<f64> = (1..=14).map(|v| v as f64).collect();
        assert!(calculate_rsi(&fourteen, 14).is_empty());
        assert!(calculate_rsi(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn rsi_warm_up_length() {
        // period + 1 closes produce exactly one value.
        let closes: Vec<f64> = (1..=15).map(|v| v as f64).collect();
        assert_eq!(calculate_rsi(&closes, 14).len(), 1);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=40).map(|v| v as f64).collect();
        for value in calculate_rsi(&closes, 14) {
            assert!((value - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=40).rev().map(|v| v as f64).collect();
        for value in calculate_rsi(&closes, 14) {
            assert!(value.abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_flat_is_50() {
        let closes = vec![42.0; 30];
        for value in calculate_rsi(&closes, 14) {
            assert!((value - 50.0).abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes: Vec<f64> =
            (0..120).map(|i| 100.0 + (i as f64 * 0.37).sin() * 8.0).collect();
        for value in calculate_rsi(&closes, 14) {
            assert!((0.0..=100.0).contains(&value), "RSI {value} out of range");
        }
    }

    #[test]
    fn latest_rsi_matches_series_tail() {
        let closes: Vec<f64> =
            (0..60).map(|i| 50.0 + (i as f64 * 0.21).cos() * 3.0).collect();
        let series = calculate_rsi(&closes, 14);
        assert_eq!(latest_rsi(&closes, 14), series.last().copied());
    }
}
