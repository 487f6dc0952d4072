// =============================================================================
// Bollinger band mean-reversion strategy
// =============================================================================
//
// BB(20, 2) at the last bar. A close at or beyond a band is a fade signal
// back toward the middle, sized by how far beyond the band the close sits
// relative to price. Band squeezes (bandwidth under 1 %) are reported as a
// low-confidence neutral instead, and moderately compressed bands are not
// traded at all: a band touch means little when the bands hug the price.

use crate::indicators::bollinger::calculate_bollinger;
use crate::indicators::zscore::zscore;
use crate::market_data::CandleSeries;
use crate::regime::MarketRegime;
use crate::types::Direction;

use super::{Strategy, StrategyError, StrategyMetadata, StrategySignal, StrategyStyle};

pub struct BollingerBandsStrategy {
    period: usize,
    num_std: f64,
    /// Bandwidth below this is a squeeze.
    squeeze_bandwidth: f64,
    /// Minimum bandwidth for band-touch signals.
    min_signal_bandwidth: f64,
    metadata: StrategyMetadata,
}

impl BollingerBandsStrategy {
    pub const NAME: &'static str = "bollinger";

    pub fn new() -> Self {
        Self {
            period: 20,
            num_std: 2.0,
            squeeze_bandwidth: 0.01,
            min_signal_bandwidth: 0.015,
            metadata: StrategyMetadata {
                name: Self::NAME.to_string(),
                style: StrategyStyle::MeanReversion,
                suitable_regimes: vec![MarketRegime::Ranging],
                default_weight: 1.0,
            },
        }
    }
}

impl Default for BollingerBandsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BollingerBandsStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    fn required_history(&self) -> usize {
        self.period
    }

    fn evaluate(&self, series: &CandleSeries) -> Result<StrategySignal, StrategyError> {
        let as_of = series.last().map(|c| c.ts).unwrap_or_default();
        if series.len() < self.required_history() {
            return Ok(StrategySignal::insufficient_data(Self::NAME, as_of));
        }

        let closes = series.closes();
        let Some(bands) = calculate_bollinger(&closes, self.period, self.num_std) else {
            return Ok(StrategySignal::neutral(
                Self::NAME,
                as_of,
                0.0,
                "bollinger_unavailable",
            ));
        };

        if bands.bandwidth < self.squeeze_bandwidth {
            return Ok(StrategySignal::neutral(Self::NAME, as_of, 0.3, "squeeze"));
        }

        let close = closes[closes.len() - 1];
        // Band z-score of the close; +/-num_std sits exactly on a band.
        let z = zscore(&closes, self.period).unwrap_or(0.0);

        let (direction, strength, reason) = if close <= bands.lower
            && bands.bandwidth >= self.min_signal_bandwidth
        {
            let strength = ((bands.lower - close) / close).clamp(0.0, 1.0);
            (
                Direction::Long,
                strength,
                format!("close {close:.2} at lower band {:.2} (z={z:.2})", bands.lower),
            )
        } else if close >= bands.upper && bands.bandwidth >= self.min_signal_bandwidth {
            let strength = (-(close - bands.upper) / close).clamp(-1.0, 0.0);
            (
                Direction::Short,
                strength,
                format!("close {close:.2} at upper band {:.2} (z={z:.2})", bands.upper),
            )
        } else if close <= bands.lower || close >= bands.upper {
            (
                Direction::Neutral,
                0.0,
                format!("band touch ignored, bandwidth {:.4} too narrow", bands.bandwidth),
            )
        } else {
            (
                Direction::Neutral,
                0.0,
                format!("close inside bands (z={z:.2})"),
            )
        };

        let confidence = match direction {
            // Distance from the middle band in sigmas, saturating at 3.
            Direction::Long | Direction::Short => (z.abs() / 3.0).clamp(0.0, 1.0),
            Direction::Neutral => 0.0,
        };

        Ok(StrategySignal {
            strategy_name: Self::NAME.to_string(),
            direction,
            strength,
            confidence,
            reasons: vec![reason],
            as_of,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;
    use chrono::{TimeZone, Utc};

    fn series_from_closes(closes: &[f64]) -> CandleSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                ts: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                open: close,
                high: close + 20.0,
                low: close - 20.0,
                close,
                volume: 1.0,
            })
            .collect();
        CandleSeries::new(candles).unwrap()
    }

    /// Alternating closes with a wide spread, ending in `last`. The window
    /// has plenty of bandwidth, and `last` controls the band position.
    fn wide_band_series(last: f64) -> CandleSeries {
        let mut closes: Vec<f64> = (0..19)
            .map(|i| if i % 2 == 0 { 95.0 } else { 105.0 })
            .collect();
        closes.push(last);
        series_from_closes(&closes)
    }

    #[test]
    fn short_series_reports_insufficient_data() {
        let series = series_from_closes(&vec![100.0; 19]);
        let signal = BollingerBandsStrategy::new().evaluate(&series).unwrap();
        assert!(signal.is_insufficient_data());
    }

    #[test]
    fn squeeze_is_low_confidence_neutral() {
        // Nearly flat closes: tiny bandwidth.
        let closes: Vec<f64> =
            (0..20).map(|i| 100.0 + (i % 2) as f64 * 0.01).collect();
        let signal = BollingerBandsStrategy::new()
            .evaluate(&series_from_closes(&closes))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.confidence, 0.3);
        assert_eq!(signal.reasons[0], "squeeze");
    }

    #[test]
    fn close_below_lower_band_is_long() {
        let signal = BollingerBandsStrategy::new()
            .evaluate(&wide_band_series(70.0))
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.strength > 0.0);
        assert!(signal.confidence > 0.0);
    }

    #[test]
    fn close_above_upper_band_is_short() {
        let signal = BollingerBandsStrategy::new()
            .evaluate(&wide_band_series(130.0))
            .unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.strength < 0.0);
    }

    #[test]
    fn close_inside_bands_is_neutral() {
        let signal = BollingerBandsStrategy::new()
            .evaluate(&wide_band_series(100.0))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.strength, 0.0);
    }

    #[test]
    fn exact_band_touch_signals_with_zero_strength() {
        // Compute the bands first, then rebuild the series closing exactly on
        // the lower band.
        let probe = wide_band_series(100.0);
        let bands = calculate_bollinger(&probe.closes(), 20, 2.0).unwrap();

        let mut closes = probe.closes();
        let last = closes.len() - 1;
        closes[last] = bands.lower;
        // Shifting the last close moves the bands; recompute until stable on
        // the touch condition is not needed, the assertion below recomputes.
        let series = series_from_closes(&closes);
        let recomputed = calculate_bollinger(&series.closes(), 20, 2.0).unwrap();
        let signal = BollingerBandsStrategy::new().evaluate(&series).unwrap();

        if closes[last] <= recomputed.lower {
            assert_eq!(signal.direction, Direction::Long);
            let expected = (recomputed.lower - closes[last]) / closes[last];
            assert!((signal.strength - expected.clamp(0.0, 1.0)).abs() < 1e-12);
        } else {
            // Moving the close dragged the band below it; still neutral.
            assert_eq!(signal.direction, Direction::Neutral);
        }
    }

    #[test]
    fn degenerate_zero_mean_window_is_neutral() {
        let closes: Vec<f64> =
            (0..20).map(|i| if i % 2 == 0 { -50.0 } else { 50.0 }).collect();
        let signal = BollingerBandsStrategy::new()
            .evaluate(&series_from_closes(&closes))
            .unwrap();
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.reasons[0], "bollinger_unavailable");
    }
}
