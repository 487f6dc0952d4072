// =============================================================================
// Shared types used across the Polaris advisor engine
// =============================================================================

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A tracked financial instrument. Built once from configuration at startup
/// and shared immutably for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Stable identifier, e.g. "BTCUSDT".
    pub id: String,
    /// Human-facing symbol, e.g. "BTC/USDT".
    pub display_symbol: String,
    /// Quote currency, e.g. "USDT".
    pub quote_currency: String,
}

impl Instrument {
    pub fn new(
        id: impl Into<String>,
        display_symbol: impl Into<String>,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_symbol: display_symbol.into(),
            quote_currency: quote_currency.into(),
        }
    }

    /// Derive display symbol and quote currency from a concatenated pair id.
    /// Falls back to the raw id when no known quote suffix matches.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        const QUOTES: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];
        for quote in QUOTES {
            if let Some(base) = id.strip_suffix(quote) {
                if !base.is_empty() {
                    return Self {
                        display_symbol: format!("{base}/{quote}"),
                        quote_currency: quote.to_string(),
                        id,
                    };
                }
            }
        }
        Self {
            display_symbol: id.clone(),
            quote_currency: String::new(),
            id,
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Bar length of a candle series. Also the granularity against which cache
/// keys are truncated and `valid_until` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Number of seconds in one bar.
    pub fn bar_seconds(&self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        }
    }

    /// Duration of one bar.
    pub fn one_bar(&self) -> Duration {
        Duration::seconds(self.bar_seconds())
    }

    /// Align a timestamp down to the start of its bar.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.bar_seconds();
        let aligned = ts.timestamp().div_euclid(secs) * secs;
        Utc.timestamp_opt(aligned, 0).single().unwrap_or(ts)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::D1
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a single strategy signal or of the condensed aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// Sign convention used by the condenser: +1 / -1 / 0.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Final recommended action of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}
