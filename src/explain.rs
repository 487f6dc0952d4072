// =============================================================================
// Explainer
// =============================================================================
//
// Deterministic string composition over a decision and the signals behind it.
// No randomness, no locale-sensitive formatting, plain ASCII throughout. Tie
// ranking is stable, so equal inputs always render identical text.

use serde::Serialize;

use crate::condenser::CondensedSignals;
use crate::decision::Decision;
use crate::types::{Action, Direction, Instrument};

/// Warning code attached when every strategy lacked data.
pub const WARN_INSUFFICIENT_DATA: &str = "insufficient_data";

/// Warning code attached to a HOLD with disagreeing contributors.
pub const WARN_LOW_CONSENSUS: &str = "low_consensus";

/// Reasons reported, ranked by effective weight times confidence.
const TOP_REASONS: usize = 3;

/// Consensus below this on a contested HOLD earns a warning.
const LOW_CONSENSUS_CUTOFF: f64 = 0.5;

/// Human-readable rendering of one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub summary: String,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

/// Render `decision` and its contributing signals into an explanation.
pub fn explain(
    instrument: &Instrument,
    decision: &Decision,
    condensed: &CondensedSignals,
) -> Explanation {
    let aggregated = &condensed.aggregated;

    // Rank contributors by effective weight * confidence, stable on ties.
    let mut ranked: Vec<usize> = (0..aggregated.contributing.len()).collect();
    ranked.sort_by(|&a, &b| {
        let score_a = condensed.effective_weights[a] * aggregated.contributing[a].confidence;
        let score_b = condensed.effective_weights[b] * aggregated.contributing[b].confidence;
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let top_reason = ranked
        .first()
        .and_then(|&i| aggregated.contributing[i].reasons.first())
        .cloned();

    let confidence_pct = (decision.confidence * 100.0).round();
    let summary = match top_reason {
        Some(reason) => format!(
            "{} {} at {confidence_pct:.0}% confidence, driven by {reason}.",
            decision.action, instrument.display_symbol
        ),
        None => format!(
            "{} {} at {confidence_pct:.0}% confidence, no strategy input available.",
            decision.action, instrument.display_symbol
        ),
    };

    let reasons: Vec<String> = ranked
        .iter()
        .filter_map(|&i| {
            let signal = &aggregated.contributing[i];
            signal
                .reasons
                .first()
                .map(|reason| format!("{}: {reason}", signal.strategy_name))
        })
        .take(TOP_REASONS)
        .collect();

    let mut warnings: Vec<String> = decision
        .invalidation
        .iter()
        .map(|condition| format!("Invalidate if {condition}"))
        .collect();

    let all_insufficient = !aggregated.contributing.is_empty()
        && aggregated.contributing.iter().all(|s| s.is_insufficient_data());
    if all_insufficient {
        warnings.push(WARN_INSUFFICIENT_DATA.to_string());
    }

    let contested = aggregated
        .contributing
        .iter()
        .any(|s| s.direction != Direction::Neutral);
    if decision.action == Action::Hold
        && contested
        && aggregated.consensus < LOW_CONSENSUS_CUTOFF
        && !all_insufficient
    {
        warnings.push(WARN_LOW_CONSENSUS.to_string());
    }

    Explanation {
        summary,
        reasons,
        warnings,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::{condense, CondenserInput};
    use crate::decision::{generate_decision, DecisionThresholds};
    use crate::market_data::Candle;
    use crate::regime::MarketRegime;
    use crate::strategy::{StrategySignal, StrategyStyle};
    use crate::types::Timeframe;
    use chrono::{DateTime, TimeZone, Utc};

    fn signal(name: &str, direction: Direction, strength: f64, reason: &str) -> StrategySignal {
        StrategySignal {
            strategy_name: name.to_string(),
            direction,
            strength,
            confidence: strength.abs(),
            reasons: vec![reason.to_string()],
            as_of: DateTime::<Utc>::default(),
        }
    }

    fn input(signal: StrategySignal, weight: f64) -> CondenserInput {
        CondenserInput {
            signal,
            weight,
            style: StrategyStyle::MeanReversion,
        }
    }

    fn instrument() -> Instrument {
        Instrument::from_id("BTCUSDT")
    }

    fn last_candle() -> Candle {
        Candle {
            ts: Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(),
            open: 10_000.0,
            high: 10_001.0,
            low: 9_999.0,
            close: 10_000.0,
            volume: 1.0,
        }
    }

    fn explain_for(inputs: Vec<CondenserInput>) -> (Explanation, Decision) {
        let condensed = condense(inputs, MarketRegime::Unknown);
        let as_of = last_candle().ts;
        let decision = generate_decision(
            &condensed.aggregated,
            &last_candle(),
            Some(100.0),
            as_of,
            Timeframe::D1,
            &DecisionThresholds::default(),
        );
        (explain(&instrument(), &decision, &condensed), decision)
    }

    #[test]
    fn summary_names_action_symbol_confidence_and_top_reason() {
        let (explanation, decision) = explain_for(vec![
            input(signal("rsi", Direction::Long, 0.9, "RSI(14) at 12.0, oversold below 30"), 1.0),
            input(signal("bollinger", Direction::Long, 0.7, "close at lower band"), 1.0),
        ]);
        assert_eq!(decision.action, Action::Buy);
        assert!(explanation.summary.starts_with("BUY BTC/USDT at "));
        assert!(explanation.summary.contains("% confidence"));
        assert!(explanation.summary.contains("RSI(14) at 12.0"));
        // ASCII only.
        assert!(explanation.summary.is_ascii());
    }

    #[test]
    fn reasons_are_top_three_by_weighted_confidence() {
        let (explanation, _) = explain_for(vec![
            input(signal("weak", Direction::Long, 0.1, "weak reason"), 1.0),
            input(signal("strong", Direction::Long, 0.9, "strong reason"), 1.0),
            input(signal("mid", Direction::Long, 0.5, "mid reason"), 1.0),
            input(signal("tiny", Direction::Long, 0.05, "tiny reason"), 1.0),
        ]);
        assert_eq!(
            explanation.reasons,
            vec![
                "strong: strong reason".to_string(),
                "mid: mid reason".to_string(),
                "weak: weak reason".to_string(),
            ]
        );
    }

    #[test]
    fn weight_outranks_raw_confidence() {
        let (explanation, _) = explain_for(vec![
            input(signal("light", Direction::Long, 0.9, "light reason"), 0.1),
            input(signal("heavy", Direction::Long, 0.5, "heavy reason"), 5.0),
        ]);
        assert_eq!(explanation.reasons[0], "heavy: heavy reason");
    }

    #[test]
    fn warnings_render_each_invalidation() {
        let (explanation, decision) = explain_for(vec![input(
            signal("rsi", Direction::Long, 0.9, "oversold"),
            1.0,
        )]);
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.invalidation.len(), 2);
        assert!(explanation.warnings[0].starts_with("Invalidate if price falls below"));
        assert!(explanation.warnings[1].starts_with("Invalidate if time passes"));
    }

    #[test]
    fn contested_hold_warns_low_consensus() {
        let (explanation, decision) = explain_for(vec![
            input(signal("rsi", Direction::Long, 0.8, "oversold"), 1.0),
            input(signal("macd_histogram", Direction::Short, -0.8, "crossed down"), 1.0),
            input(signal("bollinger", Direction::Neutral, 0.0, "squeeze"), 1.0),
        ]);
        assert_eq!(decision.action, Action::Hold);
        assert!(explanation.warnings.iter().any(|w| w == WARN_LOW_CONSENSUS));
    }

    #[test]
    fn all_insufficient_warns_insufficient_data() {
        let as_of = DateTime::<Utc>::default();
        let (explanation, decision) = explain_for(vec![
            input(StrategySignal::insufficient_data("rsi", as_of), 1.0),
            input(StrategySignal::insufficient_data("bollinger", as_of), 1.0),
        ]);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert!(explanation
            .warnings
            .iter()
            .any(|w| w.contains(WARN_INSUFFICIENT_DATA)));
        assert!(!explanation.warnings.iter().any(|w| w == WARN_LOW_CONSENSUS));
    }

    #[test]
    fn uncontested_confident_buy_has_no_extra_warnings() {
        let (explanation, _) = explain_for(vec![input(
            signal("rsi", Direction::Long, 0.9, "oversold"),
            1.0,
        )]);
        assert!(!explanation.warnings.iter().any(|w| w == WARN_LOW_CONSENSUS));
        assert!(!explanation.warnings.iter().any(|w| w == WARN_INSUFFICIENT_DATA));
    }

    #[test]
    fn explanation_is_deterministic() {
        let build = || {
            explain_for(vec![
                input(signal("rsi", Direction::Long, 0.8, "oversold"), 1.0),
                input(signal("bollinger", Direction::Long, 0.8, "lower band"), 1.0),
            ])
            .0
        };
        assert_eq!(build(), build());
    }
}
