// =============================================================================
// Signal Condenser, regime-aware weighted aggregation
// =============================================================================
//
// Folds the per-strategy signals of one engine run into a single aggregate.
// Each signal's configured weight is modulated by a static regime multiplier
// keyed by the strategy's style, the weighted mean strength picks the
// direction (with a neutral dead zone), and consensus measures how much of
// the effective weight agrees with that direction.

use serde::Serialize;

use crate::regime::MarketRegime;
use crate::strategy::{StrategySignal, StrategyStyle};
use crate::types::Direction;

/// Dead zone around zero: |S| <= EPSILON is forced neutral.
pub const EPSILON: f64 = 0.05;

/// One signal plus the registry state it was evaluated under.
pub struct CondenserInput {
    pub signal: StrategySignal,
    pub weight: f64,
    pub style: StrategyStyle,
}

/// The condensed aggregate of one run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregatedSignal {
    pub direction: Direction,
    /// Weighted mean strength in [-1, 1].
    pub strength: f64,
    /// Share of effective weight agreeing with `direction`, in [0, 1].
    pub consensus: f64,
    pub regime: MarketRegime,
    /// The input signals, original order preserved.
    pub contributing: Vec<StrategySignal>,
}

/// Condenser output: the aggregate plus the effective weight of each
/// contributing signal (same order), which the explainer ranks by.
#[derive(Debug, Clone)]
pub struct CondensedSignals {
    pub aggregated: AggregatedSignal,
    pub effective_weights: Vec<f64>,
}

/// Static regime multiplier table. Trend followers are leaned on in trends
/// and faded in ranges; mean reverters the other way around. An unknown
/// regime modulates nothing.
pub fn regime_multiplier(style: StrategyStyle, regime: MarketRegime) -> f64 {
    match (style, regime) {
        (StrategyStyle::TrendFollowing, MarketRegime::TrendingBull)
        | (StrategyStyle::TrendFollowing, MarketRegime::TrendingBear) => 1.5,
        (StrategyStyle::TrendFollowing, MarketRegime::Ranging) => 0.5,
        (StrategyStyle::MeanReversion, MarketRegime::TrendingBull)
        | (StrategyStyle::MeanReversion, MarketRegime::TrendingBear) => 0.5,
        (StrategyStyle::MeanReversion, MarketRegime::Ranging) => 1.5,
        (_, MarketRegime::Volatile) => 0.75,
        (_, MarketRegime::Unknown) => 1.0,
    }
}

/// Condense an ordered list of signals under the detected regime.
pub fn condense(inputs: Vec<CondenserInput>, regime: MarketRegime) -> CondensedSignals {
    let effective_weights: Vec<f64> = inputs
        .iter()
        .map(|input| input.weight * regime_multiplier(input.style, regime))
        .collect();

    let total_weight: f64 = effective_weights.iter().sum();
    let contributing: Vec<StrategySignal> =
        inputs.into_iter().map(|input| input.signal).collect();

    if total_weight <= 0.0 {
        return CondensedSignals {
            aggregated: AggregatedSignal {
                direction: Direction::Neutral,
                strength: 0.0,
                consensus: 0.0,
                regime,
                contributing,
            },
            effective_weights,
        };
    }

    let strength: f64 = contributing
        .iter()
        .zip(&effective_weights)
        .map(|(signal, w_eff)| w_eff * signal.strength)
        .sum::<f64>()
        / total_weight;

    let direction = if strength > EPSILON {
        Direction::Long
    } else if strength < -EPSILON {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let consensus = if direction == Direction::Neutral {
        0.0
    } else {
        let agreeing: f64 = contributing
            .iter()
            .zip(&effective_weights)
            .filter(|(signal, _)| signal.direction == direction)
            .map(|(_, w_eff)| w_eff)
            .sum();
        agreeing / total_weight
    };

    CondensedSignals {
        aggregated: AggregatedSignal {
            direction,
            strength,
            consensus,
            regime,
            contributing,
        },
        effective_weights,
    }
}
