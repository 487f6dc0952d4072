// =============================================================================
// MACD histogram crossing strategy
// =============================================================================
//
// Watches the MACD(12, 26, 9) histogram at the last two bars. A zero line
// crossing is the signal: previous bar at or below zero with the current bar
// strictly above is long, the mirror is short. Strength is the current
// histogram magnitude normalised by the rolling mean absolute histogram, so
// the number is comparable across instruments and volatility levels.
//
// A price / MACD-line divergence over the trailing bars amplifies the signal
// by 1.2x (capped at full strength): price printing a new low while the MACD
// line refuses to confirm is treated as bullish, and vice versa.

use crate::indicators::macd::{calculate_macd, MacdSeries};
use crate::market_data::CandleSeries;
use crate::regime::MarketRegime;
use crate::types::Direction;

use super::{Strategy, StrategyError, StrategyMetadata, StrategySignal, StrategyStyle};

pub struct MacdHistogramStrategy {
    fast: usize,
    slow: usize,
    signal_period: usize,
    /// Histogram samples feeding the normalisation scale.
    scale_window: usize,
    /// Bars inspected for price / MACD divergence.
    divergence_lookback: usize,
    metadata: StrategyMetadata,
}

impl MacdHistogramStrategy {
    pub const NAME: &'static str = "macd_histogram";

    const DIVERGENCE_BOOST: f64 = 1.2;

    pub fn new() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal_period: 9,
            scale_window: 20,
            divergence_lookback: 14,
            metadata: StrategyMetadata {
                name: Self::NAME.to_string(),
                style: StrategyStyle::TrendFollowing,
                suitable_regimes: vec![
                    MarketRegime::TrendingBull,
                    MarketRegime::TrendingBear,
                ],
                default_weight: 1.0,
            },
        }
    }

    /// Mean absolute histogram over the trailing `scale_window` samples.
    fn scale(&self, macd: &MacdSeries) -> f64 {
        let n = macd.histogram.len().min(self.scale_window);
        let tail = &macd.histogram[macd.histogram.len() - n..];
        tail.iter().map(|h| h.abs()).sum::<f64>() / n as f64
    }

    /// Bullish divergence: over the lookback, price prints its low on the
    /// last bar while the MACD line sits above its own earlier low. Bearish
    /// is the mirror with highs.
    fn divergence(&self, closes: &[f64], line: &[f64]) -> (bool, bool) {
        let n = self.divergence_lookback.min(closes.len()).min(line.len());
        if n < 3 {
            return (false, false);
        }
        let closes = &closes[closes.len() - n..];
        let line = &line[line.len() - n..];
        let last = n - 1;

        let earlier_price_min =
            closes[..last].iter().cloned().fold(f64::INFINITY, f64::min);
        let earlier_price_max =
            closes[..last].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let earlier_line_min = line[..last].iter().cloned().fold(f64::INFINITY, f64::min);
        let earlier_line_max =
            line[..last].iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let bullish = closes[last] < earlier_price_min && line[last] > earlier_line_min;
        let bearish = closes[last] > earlier_price_max && line[last] < earlier_line_max;
        (bullish, bearish)
    }
}

impl Default for MacdHistogramStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MacdHistogramStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    fn required_history(&self) -> usize {
        // Histogram warm-up is slow + signal - 2 closes before the first
        // sample; 40 leaves a handful of samples for the scale window.
        40
    }

    fn evaluate(&self, series: &CandleSeries) -> Result<StrategySignal, StrategyError> {
        let as_of = series.last().map(|c| c.ts).unwrap_or_default();
        if series.len() < self.required_history() {
            return Ok(StrategySignal::insufficient_data(Self::NAME, as_of));
        }

        let closes = series.closes();
        let macd = calculate_macd(&closes, self.fast, self.slow, self.signal_period);
        if macd.len() < 2 {
            return Ok(StrategySignal::neutral(
                Self::NAME,
                as_of,
                0.0,
                "macd_unavailable",
            ));
        }

        let h_prev = macd.histogram[macd.len() - 2];
        let h_cur = macd.histogram[macd.len() - 1];

        let crossed_up = h_prev <= 0.0 && h_cur > 0.0;
        let crossed_down = h_prev >= 0.0 && h_cur < 0.0;

        if !crossed_up && !crossed_down {
            return Ok(StrategySignal::neutral(
                Self::NAME,
                as_of,
                0.0,
                format!("no histogram crossing (h={h_cur:.4})"),
            ));
        }

        let scale = self.scale(&macd);
        // A crossing implies |h_cur| > 0, so the mean absolute scale is
        // positive as well.
        let magnitude = (h_cur.abs() / scale).min(1.0);

        let (bullish_div, bearish_div) = self.divergence(&closes, &macd.line);

        let mut reasons = vec![if crossed_up {
            format!("histogram crossed above zero (h={h_cur:.4})")
        } else {
            format!("histogram crossed below zero (h={h_cur:.4})")
        }];

        let mut strength = if crossed_up { magnitude } else { -magnitude };
        if crossed_up && bullish_div {
            strength = (strength * Self::DIVERGENCE_BOOST).min(1.0);
            reasons.push("bullish price/MACD divergence".to_string());
        } else if crossed_down && bearish_div {
            strength = (strength * Self::DIVERGENCE_BOOST).max(-1.0);
            reasons.push("bearish price/MACD divergence".to_string());
        }

        Ok(StrategySignal {
            strategy_name: Self::NAME.to_string(),
            direction: if crossed_up { Direction::Long } else { Direction::Short },
            strength,
            confidence: strength.abs(),
            reasons,
            as_of,
        })
    }
}
