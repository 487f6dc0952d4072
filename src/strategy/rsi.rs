// =============================================================================
// RSI mean-reversion strategy
// =============================================================================
//
// Reads RSI(14) at the last bar. Oversold (below 30) is a long signal whose
// strength grows linearly toward RSI 0; overbought (above 70) is the mirror
// short. The exact 30 / 70 boundaries are neutral.

use crate::indicators::rsi::latest_rsi;
use crate::market_data::CandleSeries;
use crate::regime::MarketRegime;
use crate::types::Direction;

use super::{Strategy, StrategyError, StrategyMetadata, StrategySignal, StrategyStyle};

pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
    metadata: StrategyMetadata,
}

impl RsiStrategy {
    pub const NAME: &'static str = "rsi";

    pub fn new() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
            metadata: StrategyMetadata {
                name: Self::NAME.to_string(),
                style: StrategyStyle::MeanReversion,
                suitable_regimes: vec![MarketRegime::Ranging, MarketRegime::Volatile],
                default_weight: 1.0,
            },
        }
    }
}

impl RsiStrategy {
    /// Map an RSI reading to direction and signed strength. The band edges
    /// themselves are neutral; both comparisons are strict.
    fn classify(&self, rsi: f64) -> (Direction, f64) {
        if rsi < self.oversold {
            (
                Direction::Long,
                ((self.oversold - rsi) / self.oversold).clamp(0.0, 1.0),
            )
        } else if rsi > self.overbought {
            let span = 100.0 - self.overbought;
            (
                Direction::Short,
                (-(rsi - self.overbought) / span).clamp(-1.0, 0.0),
            )
        } else {
            (Direction::Neutral, 0.0)
        }
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RsiStrategy {
    fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    fn required_history(&self) -> usize {
        // period deltas need period + 1 closes.
        self.period + 1
    }

    fn evaluate(&self, series: &CandleSeries) -> Result<StrategySignal, StrategyError> {
        let as_of = series.last().map(|c| c.ts).unwrap_or_default();
        if series.len() < self.required_history() {
            return Ok(StrategySignal::insufficient_data(Self::NAME, as_of));
        }

        let closes = series.closes();
        let Some(rsi) = latest_rsi(&closes, self.period) else {
            return Ok(StrategySignal::neutral(
                Self::NAME,
                as_of,
                0.0,
                "rsi_unavailable",
            ));
        };

        let (direction, strength) = self.classify(rsi);

        let reason = match direction {
            Direction::Long => format!("RSI({}) at {rsi:.1}, oversold below {:.0}", self.period, self.oversold),
            Direction::Short => format!("RSI({}) at {rsi:.1}, overbought above {:.0}", self.period, self.overbought),
            Direction::Neutral => format!("RSI({}) at {rsi:.1}, inside neutral band", self.period),
        };

        Ok(StrategySignal {
            strategy_name: Self::NAME.to_string(),
            direction,
            strength,
            confidence: strength.abs(),
            reasons: vec![reason],
            as_of,
        })
    }
}
