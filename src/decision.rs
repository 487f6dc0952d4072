// =============================================================================
// Decision Generator
// =============================================================================
//
// Turns one aggregated signal into an actionable decision. Confidence blends
// aggregate strength and consensus; only a confident, directional aggregate
// becomes a BUY or SELL, everything else is a HOLD. Risk levels are sized
// from ATR at the last bar, and every decision carries the conditions under
// which it stops being valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condenser::AggregatedSignal;
use crate::market_data::Candle;
use crate::types::{Action, Direction, Timeframe};

/// A machine-checkable, human-renderable invalidation condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "operands", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    PriceBelow { price: f64 },
    PriceAbove { price: f64 },
    IndicatorExceeds { indicator: String, threshold: f64 },
    TimeElapsed { at: DateTime<Utc> },
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriceBelow { price } => write!(f, "price falls below {price:.2}"),
            Self::PriceAbove { price } => write!(f, "price rises above {price:.2}"),
            Self::IndicatorExceeds { indicator, threshold } => {
                write!(f, "{indicator} exceeds {threshold:.2}")
            }
            Self::TimeElapsed { at } => {
                write!(f, "time passes {}", at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            }
        }
    }
}

/// Tunable cutoffs and multipliers of the generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Minimum |S| for a directional action.
    pub min_strength: f64,
    /// Minimum blended confidence for a directional action.
    pub min_confidence: f64,
    /// Stop distance in ATR multiples.
    pub stop_atr_multiplier: f64,
    /// Target distance in ATR multiples.
    pub target_atr_multiplier: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            min_confidence: 0.60,
            stop_atr_multiplier: 2.0,
            target_atr_multiplier: 3.0,
        }
    }
}

/// The actionable output of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub valid_until: DateTime<Utc>,
    pub invalidation: Vec<Condition>,
}

/// Generate the decision for `aggregated` at the last candle of the window.
///
/// `atr` is ATR(14) at that candle; without it no price levels can be sized,
/// so a directional aggregate degrades to HOLD.
pub fn generate_decision(
    aggregated: &AggregatedSignal,
    last_candle: &Candle,
    atr: Option<f64>,
    as_of: DateTime<Utc>,
    timeframe: Timeframe,
    thresholds: &DecisionThresholds,
) -> Decision {
    let valid_until = as_of + timeframe.one_bar();
    let strength = aggregated.strength;
    let confidence =
        (0.6 * strength.abs() + 0.4 * aggregated.consensus).clamp(0.0, 1.0);

    let directional = strength.abs() >= thresholds.min_strength
        && confidence >= thresholds.min_confidence;

    let action = match aggregated.direction {
        Direction::Long if directional && atr.is_some() => Action::Buy,
        Direction::Short if directional && atr.is_some() => Action::Sell,
        _ => Action::Hold,
    };

    if action == Action::Hold {
        return Decision {
            action,
            confidence,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            valid_until,
            invalidation: vec![Condition::TimeElapsed { at: valid_until }],
        };
    }

    let atr = atr.unwrap_or_default();
    let entry = last_candle.close;
    let (stop_loss, take_profit, stop_condition) = match action {
        Action::Buy => {
            let stop = entry - thresholds.stop_atr_multiplier * atr;
            (
                stop,
                entry + thresholds.target_atr_multiplier * atr,
                Condition::PriceBelow { price: stop },
            )
        }
        Action::Sell => {
            let stop = entry + thresholds.stop_atr_multiplier * atr;
            (
                stop,
                entry - thresholds.target_atr_multiplier * atr,
                Condition::PriceAbove { price: stop },
            )
        }
        Action::Hold => unreachable!(),
    };

    Decision {
        action,
        confidence,
        entry_price: Some(entry),
        stop_loss: Some(stop_loss),
        take_profit: Some(take_profit),
        valid_until,
        invalidation: vec![stop_condition, Condition::TimeElapsed { at: valid_until }],
    }
}
