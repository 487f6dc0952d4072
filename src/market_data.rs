// ---------------------------------------------------------------------------
// Market data model and provider seam
// ---------------------------------------------------------------------------
//
// The engine never talks to an exchange directly. It reads candle windows
// through the `MarketDataProvider` trait; anything that can serve an ordered
// OHLCV window can back the engine. `FixtureProvider` is the in-memory
// implementation used by tests and the demo wiring of the binary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Timeframe;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure modes of a market data provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    /// The provider could not deliver the requested window at all.
    #[error("market data unavailable: {0}")]
    Unavailable(String),

    /// The provider delivered fewer bars than the engine requires.
    #[error("insufficient history: got {got} bars, need {need}")]
    InsufficientHistory { got: usize, need: usize },
}

// ---------------------------------------------------------------------------
// Candle & CandleSeries
// ---------------------------------------------------------------------------

/// A single OHLCV bar. Timestamps are UTC and minute-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Structural sanity: low <= min(open, close), max(open, close) <= high,
    /// volume >= 0, all fields finite.
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.volume >= 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }

    /// (high + low + close) / 3, the usual VWAP input.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Read-only, ascending-by-timestamp sequence of candles for one
/// `(instrument, timeframe)`. Construction validates ordering and candle
/// shape so downstream code can index freely.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series, rejecting malformed candles and non-increasing
    /// timestamps.
    pub fn new(candles: Vec<Candle>) -> Result<Self, DataError> {
        for (i, candle) in candles.iter().enumerate() {
            if !candle.is_well_formed() {
                return Err(DataError::Unavailable(format!(
                    "malformed candle at index {i} ({})",
                    candle.ts
                )));
            }
            if i > 0 && candles[i - 1].ts >= candle.ts {
                return Err(DataError::Unavailable(format!(
                    "non-increasing timestamp at index {i} ({})",
                    candle.ts
                )));
            }
        }
        Ok(Self { candles })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Look a candle up by exact timestamp.
    pub fn at_ts(&self, ts: DateTime<Utc>) -> Option<&Candle> {
        self.candles
            .binary_search_by_key(&ts, |c| c.ts)
            .ok()
            .map(|i| &self.candles[i])
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Read-only abstraction over candle storage.
///
/// Contract: returns at least `lookback_bars` candles ending at or before
/// `end_ts`, in ascending timestamp order. Fails with
/// [`DataError::InsufficientHistory`] when fewer bars exist. Must be safe for
/// concurrent calls and must not mutate any shared state.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        end_ts: DateTime<Utc>,
        lookback_bars: usize,
    ) -> Result<CandleSeries, DataError>;
}

// ---------------------------------------------------------------------------
// FixtureProvider -- in-memory provider for tests and demo wiring
// ---------------------------------------------------------------------------

/// Serves windows out of pre-loaded candle vectors. Immutable after
/// construction, so concurrent reads need no locking.
#[derive(Debug, Default)]
pub struct FixtureProvider {
    series: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candle vector for `(instrument, timeframe)`. Replaces any
    /// existing fixture for the same key.
    pub fn with_series(
        mut self,
        instrument: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Self {
        self.series.insert((instrument.into(), timeframe), candles);
        self
    }
}

#[async_trait]
impl MarketDataProvider for FixtureProvider {
    async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        end_ts: DateTime<Utc>,
        lookback_bars: usize,
    ) -> Result<CandleSeries, DataError> {
        let candles = self
            .series
            .get(&(instrument.to_string(), timeframe))
            .ok_or_else(|| {
                DataError::Unavailable(format!("no fixture for {instrument}@{timeframe}"))
            })?;

        // Candles at or before the requested end, most recent `lookback_bars`.
        let eligible: Vec<Candle> = candles.iter().filter(|c| c.ts <= end_ts).copied().collect();
        if eligible.len() < lookback_bars {
            return Err(DataError::InsufficientHistory {
                got: eligible.len(),
                need: lookback_bars,
            });
        }
        let start = eligible.len() - lookback_bars;
        CandleSeries::new(eligible[start..].to_vec())
    }
}
