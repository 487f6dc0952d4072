// =============================================================================
// Market Regime Detection
// =============================================================================
//
// Classifies the market for one instrument into a coarse regime used to
// modulate strategy weights. Inputs are ADX(14) with its directional
// components and ATR(14) as a fraction of the last close.
//
// Classification ladder (first match wins):
//
//   1. UNKNOWN        indicators not computable (short or degenerate input)
//   2. VOLATILE       ATR fraction > 5 % of price
//   3. TRENDING_BULL  ADX >= 25 and +DI > -DI
//      TRENDING_BEAR  ADX >= 25 and -DI > +DI
//   4. RANGING        ADX < 20
//   5. UNKNOWN        the 20..25 ADX gray zone commits to nothing

use serde::{Deserialize, Serialize};

use crate::indicators::adx::calculate_adx;
use crate::indicators::atr::calculate_atr_fraction;
use crate::market_data::Candle;

/// Period shared by the ADX and ATR reads backing regime detection.
pub const REGIME_PERIOD: usize = 14;

/// ATR as a fraction of price above which the market counts as volatile.
const VOLATILE_ATR_FRACTION: f64 = 0.05;

/// ADX at or above this is a trending market.
const TRENDING_ADX: f64 = 25.0;

/// ADX below this is a ranging market.
const RANGING_ADX: f64 = 20.0;

/// Coarse market behavior classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingBull,
    TrendingBear,
    Ranging,
    Volatile,
    Unknown,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendingBull => write!(f, "TRENDING_BULL"),
            Self::TrendingBear => write!(f, "TRENDING_BEAR"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Volatile => write!(f, "VOLATILE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Detect the regime at the last bar of `candles`.
///
/// Never fails: anything the indicators cannot classify reads as
/// [`MarketRegime::Unknown`].
pub fn detect_regime(candles: &[Candle]) -> MarketRegime {
    let directional = calculate_adx(candles, REGIME_PERIOD);
    let atr_fraction = calculate_atr_fraction(candles, REGIME_PERIOD);

    match (directional, atr_fraction) {
        (Some(di), Some(atr_frac)) => classify(di.adx, di.plus_di, di.minus_di, atr_frac),
        _ => MarketRegime::Unknown,
    }
}

fn classify(adx: f64, plus_di: f64, minus_di: f64, atr_fraction: f64) -> MarketRegime {
    if atr_fraction > VOLATILE_ATR_FRACTION {
        return MarketRegime::Volatile;
    }
    if adx >= TRENDING_ADX {
        if plus_di > minus_di {
            return MarketRegime::TrendingBull;
        }
        if minus_di > plus_di {
            return MarketRegime::TrendingBear;
        }
        // Strong but directionless reading; do not guess.
        return MarketRegime::Unknown;
    }
    if adx < RANGING_ADX {
        return MarketRegime::Ranging;
    }
    MarketRegime::Unknown
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            ts: Utc.timestamp_opt(i * 60, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn classify_volatile_wins_over_trend() {
        assert_eq!(classify(40.0, 30.0, 10.0, 0.08), MarketRegime::Volatile);
    }

    #[test]
    fn classify_trending_directions() {
        assert_eq!(classify(30.0, 30.0, 10.0, 0.01), MarketRegime::TrendingBull);
        assert_eq!(classify(30.0, 10.0, 30.0, 0.01), MarketRegime::TrendingBear);
        // Equal DI readings do not commit to a direction.
        assert_eq!(classify(30.0, 20.0, 20.0, 0.01), MarketRegime::Unknown);
    }

    #[test]
    fn classify_ranging_and_gray_zone() {
        assert_eq!(classify(15.0, 12.0, 11.0, 0.01), MarketRegime::Ranging);
        assert_eq!(classify(22.0, 12.0, 11.0, 0.01), MarketRegime::Unknown);
    }

    #[test]
    fn detect_short_series_is_unknown() {
        let candles: Vec<Candle> =
            (0..10).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        assert_eq!(detect_regime(&candles), MarketRegime::Unknown);
    }

    #[test]
    fn detect_steady_uptrend_is_trending_bull() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                candle(i, base, base + 0.4, base - 0.1, base + 0.3)
            })
            .collect();
        assert_eq!(detect_regime(&candles), MarketRegime::TrendingBull);
    }

    #[test]
    fn detect_steady_downtrend_is_trending_bear() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 200.0 - i as f64 * 0.5;
                candle(i, base, base + 0.1, base - 0.4, base - 0.3)
            })
            .collect();
        assert_eq!(detect_regime(&candles), MarketRegime::TrendingBear);
    }

    #[test]
    fn detect_wide_bars_is_volatile() {
        // 10 % bar ranges around a flat price: huge ATR relative to close.
        let candles: Vec<Candle> =
            (0..60).map(|i| candle(i, 100.0, 106.0, 94.0, 100.0)).collect();
        assert_eq!(detect_regime(&candles), MarketRegime::Volatile);
    }

    #[test]
    fn regime_wire_format() {
        assert_eq!(
            serde_json::to_string(&MarketRegime::TrendingBull).unwrap(),
            "\"TRENDING_BULL\""
        );
        assert_eq!(serde_json::to_string(&MarketRegime::Unknown).unwrap(), "\"UNKNOWN\"");
    }
}
