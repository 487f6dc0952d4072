// =============================================================================
// Strategy plug-in model
// =============================================================================
//
// A strategy is a pure function from a candle window to a signal, packaged
// with its metadata. Strategies never perform I/O and hold no mutable state;
// the registry owns the mutable parts (weight, enabled flag).
//
// A strategy handed a window shorter than its declared `required_history`
// reports a neutral "insufficient_data" signal instead of erroring; the error
// channel is reserved for genuine evaluation failures.

pub mod bollinger;
pub mod macd_histogram;
pub mod registry;
pub mod rsi;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market_data::CandleSeries;
use crate::regime::MarketRegime;
use crate::types::Direction;

/// Reason code attached to signals produced from a too-short window.
pub const INSUFFICIENT_DATA: &str = "insufficient_data";

/// Failure of a single strategy evaluation. Absorbed at the engine boundary;
/// it never fails a whole run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("strategy evaluation failed: {0}")]
    Evaluation(String),
}

/// Broad behavioral family of a strategy; the condenser's regime multiplier
/// table is keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStyle {
    TrendFollowing,
    MeanReversion,
}

/// Static description of a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMetadata {
    pub name: String,
    pub style: StrategyStyle,
    /// Regimes the strategy is considered best suited for.
    pub suitable_regimes: Vec<MarketRegime>,
    pub default_weight: f64,
}

/// Output of one strategy evaluation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StrategySignal {
    pub strategy_name: String,
    pub direction: Direction,
    /// Signed strength in [-1, 1]; sign matches `direction`.
    pub strength: f64,
    /// Self-assessed confidence in [0, 1].
    pub confidence: f64,
    /// Short human-readable reasons, most important first.
    pub reasons: Vec<String>,
    /// Evaluation instant; audit-only, not part of the wire shape.
    #[serde(skip_serializing)]
    pub as_of: DateTime<Utc>,
}

impl StrategySignal {
    pub fn neutral(
        strategy_name: impl Into<String>,
        as_of: DateTime<Utc>,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            direction: Direction::Neutral,
            strength: 0.0,
            confidence,
            reasons: vec![reason.into()],
            as_of,
        }
    }

    /// The mandatory response to a window shorter than `required_history`.
    pub fn insufficient_data(strategy_name: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self::neutral(strategy_name, as_of, 0.0, INSUFFICIENT_DATA)
    }

    pub fn is_insufficient_data(&self) -> bool {
        self.reasons.iter().any(|r| r == INSUFFICIENT_DATA)
    }
}

/// The strategy capability set: metadata, history demand, pure evaluation.
pub trait Strategy: Send + Sync {
    fn metadata(&self) -> &StrategyMetadata;

    /// Minimum number of bars `evaluate` needs to produce a real signal.
    fn required_history(&self) -> usize;

    /// Evaluate the window at its last candle. Pure; must not panic on any
    /// well-formed series, however short.
    fn evaluate(&self, series: &CandleSeries) -> Result<StrategySignal, StrategyError>;
}
