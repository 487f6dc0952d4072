// =============================================================================
// Recommendation Engine
// =============================================================================
//
// Orchestrates one recommendation for one `(instrument, as_of)`: snapshot the
// registry, fetch the candle window, read ATR and regime, evaluate every
// enabled strategy in parallel, condense, decide, explain.
//
// Failure policy: a single strategy failing contributes a neutral placeholder
// and never sinks the run. Provider failure surfaces as `NoData`. A provider
// that has *some* history but less than the strategies demand still produces
// a run; the starved strategies report insufficient_data and the result is a
// zero-confidence HOLD, so callers always see a recommendation whenever any
// data exists at all.
//
// Cancellation: the caller's token is checked between pipeline steps and
// raced against the provider call; a tripped token yields
// `EngineError::Cancelled` and nothing is cached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::condenser::{condense, AggregatedSignal, CondenserInput};
use crate::decision::{generate_decision, Decision, DecisionThresholds};
use crate::explain::{explain, Explanation};
use crate::market_data::{CandleSeries, DataError, MarketDataProvider};
use crate::observer::{EngineEvent, Observer};
use crate::regime::{detect_regime, REGIME_PERIOD};
use crate::strategy::registry::{RegistryEntry, StrategyRegistry};
use crate::strategy::StrategySignal;
use crate::types::{Instrument, Timeframe};
use crate::{indicators, ENGINE_VERSION};

/// Terminal failures of one engine run. `Clone` because the cache fans one
/// result out to every single-flight waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The provider could not deliver any usable window.
    #[error("no market data: {0}")]
    NoData(String),

    /// Cooperative cancellation was observed mid-run.
    #[error("engine run cancelled")]
    Cancelled,

    #[error("internal engine failure: {0}")]
    Internal(String),
}

/// The cached, served artifact of one engine run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recommendation {
    pub instrument: String,
    pub as_of: DateTime<Utc>,
    pub decision: Decision,
    pub aggregated: AggregatedSignal,
    pub explanation: Explanation,
    pub engine_version: String,
}

/// Internal outcome of one provider call; keeps the shortfall-retry logic
/// able to tell "fewer bars than asked" apart from terminal failures.
enum FetchFailure {
    Data(DataError),
    DeadlineExceeded,
    Cancelled,
}

impl FetchFailure {
    fn into_engine_error(self) -> EngineError {
        match self {
            Self::Data(err) => EngineError::NoData(err.to_string()),
            Self::DeadlineExceeded => EngineError::NoData("provider deadline exceeded".into()),
            Self::Cancelled => EngineError::Cancelled,
        }
    }
}

pub struct RecommendationEngine {
    provider: Arc<dyn MarketDataProvider>,
    registry: Arc<StrategyRegistry>,
    observer: Arc<dyn Observer>,
    timeframe: Timeframe,
    thresholds: DecisionThresholds,
    provider_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        registry: Arc<StrategyRegistry>,
        observer: Arc<dyn Observer>,
        timeframe: Timeframe,
        thresholds: DecisionThresholds,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            observer,
            timeframe,
            thresholds,
            provider_timeout,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Produce the recommendation for `instrument` as of `as_of`.
    pub async fn recommend(
        &self,
        instrument: &Instrument,
        as_of: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Recommendation, EngineError> {
        let started = Instant::now();
        self.observer.on_event(&EngineEvent::EngineRunStarted {
            instrument: instrument.id.clone(),
            as_of,
        });

        // 1. Registry snapshot; later writes are invisible to this run.
        let snapshot = self.registry.snapshot();
        let enabled: Vec<RegistryEntry> = snapshot.enabled().cloned().collect();

        // The window must cover the hungriest strategy and the regime reads.
        let required = snapshot
            .required_history()
            .unwrap_or(0)
            .max(2 * REGIME_PERIOD + 1);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // 2. Fetch the candle window, degrading to whatever history exists.
        let series = self.fetch_window(instrument, as_of, required, cancel).await?;
        let last_candle = *series
            .last()
            .ok_or_else(|| EngineError::NoData("provider returned an empty series".into()))?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // 3. Volatility and regime context at the last bar.
        let atr = indicators::atr::calculate_atr(series.candles(), REGIME_PERIOD);
        let regime = detect_regime(series.candles());
        debug!(
            instrument = %instrument.id,
            regime = %regime,
            bars = series.len(),
            generation = snapshot.generation,
            "engine context ready"
        );

        // 4. Evaluate enabled strategies in parallel, results in registry
        // order regardless of completion order.
        let series = Arc::new(series);
        let handles: Vec<_> = enabled
            .iter()
            .map(|entry| {
                let strategy = Arc::clone(&entry.strategy);
                let series = Arc::clone(&series);
                tokio::spawn(async move { strategy.evaluate(&series) })
            })
            .collect();

        let outcomes = join_all(handles).await;
        let mut inputs = Vec::with_capacity(enabled.len());
        for (entry, outcome) in enabled.iter().zip(outcomes) {
            let name = entry.name().to_string();
            let signal = match outcome {
                Ok(Ok(signal)) => signal,
                Ok(Err(err)) => self.absorb_failure(instrument, &name, err.to_string(), as_of),
                Err(join_err) => {
                    self.absorb_failure(instrument, &name, join_err.to_string(), as_of)
                }
            };
            inputs.push(CondenserInput {
                signal,
                weight: entry.weight,
                style: entry.strategy.metadata().style,
            });
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // 5. Condense, decide, explain.
        let condensed = condense(inputs, regime);
        let decision = generate_decision(
            &condensed.aggregated,
            &last_candle,
            atr,
            as_of,
            self.timeframe,
            &self.thresholds,
        );
        let explanation = explain(instrument, &decision, &condensed);

        // 6. Stamp and return.
        let recommendation = Recommendation {
            instrument: instrument.id.clone(),
            as_of,
            decision,
            aggregated: condensed.aggregated,
            explanation,
            engine_version: ENGINE_VERSION.to_string(),
        };

        self.observer.on_event(&EngineEvent::EngineRunFinished {
            instrument: instrument.id.clone(),
            as_of,
            action: recommendation.decision.action,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Ok(recommendation)
    }

    /// Fetch at least `required` bars; when the provider has history but not
    /// enough of it, retry with what it has so the run can still degrade to a
    /// HOLD instead of failing outright.
    async fn fetch_window(
        &self,
        instrument: &Instrument,
        as_of: DateTime<Utc>,
        required: usize,
        cancel: &CancellationToken,
    ) -> Result<CandleSeries, EngineError> {
        match self.fetch_once(instrument, as_of, required, cancel).await {
            Ok(series) => Ok(series),
            Err(FetchFailure::Data(DataError::InsufficientHistory { got, .. })) if got > 0 => {
                self.fetch_once(instrument, as_of, got, cancel)
                    .await
                    .map_err(FetchFailure::into_engine_error)
            }
            Err(failure) => Err(failure.into_engine_error()),
        }
    }

    /// One deadline-bounded, cancellable provider call.
    async fn fetch_once(
        &self,
        instrument: &Instrument,
        as_of: DateTime<Utc>,
        lookback: usize,
        cancel: &CancellationToken,
    ) -> Result<CandleSeries, FetchFailure> {
        let fetch = self
            .provider
            .get_candles(&instrument.id, self.timeframe, as_of, lookback);
        let deadline = tokio::time::timeout(self.provider_timeout, fetch);

        tokio::select! {
            _ = cancel.cancelled() => Err(FetchFailure::Cancelled),
            result = deadline => match result {
                Ok(Ok(series)) => Ok(series),
                Ok(Err(err)) => Err(FetchFailure::Data(err)),
                Err(_) => Err(FetchFailure::DeadlineExceeded),
            },
        }
    }

    fn absorb_failure(
        &self,
        instrument: &Instrument,
        strategy: &str,
        error: String,
        as_of: DateTime<Utc>,
    ) -> StrategySignal {
        self.observer.on_event(&EngineEvent::StrategyFailed {
            instrument: instrument.id.clone(),
            strategy: strategy.to_string(),
            error,
        });
        StrategySignal::neutral(strategy, as_of, 0.0, "evaluation_error")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Candle, FixtureProvider};
    use crate::observer::RecordingObserver;
    use crate::regime::MarketRegime;
    use crate::strategy::bollinger::BollingerBandsStrategy;
    use crate::strategy::macd_histogram::MacdHistogramStrategy;
    use crate::strategy::rsi::RsiStrategy;
    use crate::strategy::{
        Strategy, StrategyError, StrategyMetadata, StrategyStyle,
    };
    use crate::types::Action;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn wave_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.35).sin() * 4.0;
                Candle {
                    ts: Utc.timestamp_opt(i as i64 * 86_400, 0).unwrap(),
                    open: close - 0.2,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn standard_registry() -> Arc<StrategyRegistry> {
        let registry = StrategyRegistry::new();
        registry.register(Arc::new(RsiStrategy::new()));
        registry.register(Arc::new(MacdHistogramStrategy::new()));
        registry.register(Arc::new(BollingerBandsStrategy::new()));
        Arc::new(registry)
    }

    fn engine_with(
        provider: Arc<dyn MarketDataProvider>,
        registry: Arc<StrategyRegistry>,
        observer: Arc<RecordingObserver>,
    ) -> RecommendationEngine {
        RecommendationEngine::new(
            provider,
            registry,
            observer,
            Timeframe::D1,
            DecisionThresholds::default(),
            Duration::from_secs(5),
        )
    }

    fn as_of(candles: &[Candle]) -> DateTime<Utc> {
        candles.last().unwrap().ts
    }

    #[tokio::test]
    async fn produces_recommendation_with_audit_trail() {
        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer.clone());

        let rec = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rec.instrument, "BTCUSDT");
        assert_eq!(rec.as_of, when);
        assert_eq!(rec.engine_version, ENGINE_VERSION);
        assert!(rec.decision.valid_until > when);

        // Contributing signals appear in registration order.
        let names: Vec<&str> = rec
            .aggregated
            .contributing
            .iter()
            .map(|s| s.strategy_name.as_str())
            .collect();
        assert_eq!(names, vec!["rsi", "macd_histogram", "bollinger"]);

        // Run lifecycle events were emitted.
        assert_eq!(
            observer.count_matching(|e| matches!(e, EngineEvent::EngineRunStarted { .. })),
            1
        );
        assert_eq!(
            observer.count_matching(|e| matches!(e, EngineEvent::EngineRunFinished { .. })),
            1
        );
    }

    #[tokio::test]
    async fn short_history_degrades_to_hold_with_warning() {
        // Ten bars: less than every strategy's requirement.
        let candles = wave_candles(10);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer);

        let rec = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rec.decision.action, Action::Hold);
        assert_eq!(rec.decision.confidence, 0.0);
        assert!(rec
            .explanation
            .warnings
            .iter()
            .any(|w| w.contains("insufficient_data")));
        assert!(rec
            .aggregated
            .contributing
            .iter()
            .all(|s| s.is_insufficient_data()));
        // Too little history for ADX: the regime cannot be classified.
        assert_eq!(rec.aggregated.regime, MarketRegime::Unknown);
    }

    #[tokio::test]
    async fn missing_instrument_is_no_data() {
        let provider = Arc::new(FixtureProvider::new());
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer);

        let err = engine
            .recommend(
                &Instrument::from_id("ETHUSDT"),
                Utc.timestamp_opt(0, 0).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoData(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    struct FailingStrategy {
        metadata: StrategyMetadata,
    }

    impl FailingStrategy {
        fn new() -> Self {
            Self {
                metadata: StrategyMetadata {
                    name: "failing".to_string(),
                    style: StrategyStyle::TrendFollowing,
                    suitable_regimes: vec![MarketRegime::Unknown],
                    default_weight: 1.0,
                },
            }
        }
    }

    impl Strategy for FailingStrategy {
        fn metadata(&self) -> &StrategyMetadata {
            &self.metadata
        }

        fn required_history(&self) -> usize {
            1
        }

        fn evaluate(&self, _series: &CandleSeries) -> Result<StrategySignal, StrategyError> {
            Err(StrategyError::Evaluation("synthetic failure".into()))
        }
    }

    #[tokio::test]
    async fn strategy_failure_is_absorbed_as_neutral_placeholder() {
        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let registry = StrategyRegistry::new();
        registry.register(Arc::new(RsiStrategy::new()));
        registry.register(Arc::new(FailingStrategy::new()));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, Arc::new(registry), observer.clone());

        let rec = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
            .await
            .unwrap();

        let placeholder = rec
            .aggregated
            .contributing
            .iter()
            .find(|s| s.strategy_name == "failing")
            .unwrap();
        assert_eq!(placeholder.strength, 0.0);
        assert_eq!(placeholder.reasons[0], "evaluation_error");
        assert_eq!(
            observer.count_matching(|e| matches!(e, EngineEvent::StrategyFailed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn mid_flight_registry_change_does_not_affect_run() {
        // A provider that reports when a fetch has entered (the registry
        // snapshot is already taken by then) and stalls until released, so
        // the test can mutate the registry while the run is in flight.
        struct GatedProvider {
            inner: FixtureProvider,
            entered: tokio::sync::Notify,
            gate: tokio::sync::Semaphore,
        }

        #[async_trait]
        impl MarketDataProvider for GatedProvider {
            async fn get_candles(
                &self,
                instrument: &str,
                timeframe: Timeframe,
                end_ts: DateTime<Utc>,
                lookback_bars: usize,
            ) -> Result<CandleSeries, crate::market_data::DataError> {
                self.entered.notify_one();
                let _permit = self.gate.acquire().await.expect("gate closed");
                self.inner
                    .get_candles(instrument, timeframe, end_ts, lookback_bars)
                    .await
            }
        }

        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider = Arc::new(GatedProvider {
            inner: FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles),
            entered: tokio::sync::Notify::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let registry = standard_registry();
        let observer = Arc::new(RecordingObserver::new());
        let engine = Arc::new(engine_with(provider.clone(), registry.clone(), observer));

        let run_engine = engine.clone();
        let run = tokio::spawn(async move {
            run_engine
                .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
                .await
        });

        // Disable a strategy once the run is blocked inside the provider
        // (its snapshot is already taken), then release the gate.
        provider.entered.notified().await;
        registry.set_enabled("bollinger", false).unwrap();
        provider.gate.add_permits(16);

        let rec = run.await.unwrap().unwrap();
        // The in-flight run still lists the now-disabled strategy...
        assert!(rec
            .aggregated
            .contributing
            .iter()
            .any(|s| s.strategy_name == "bollinger"));

        // ...and the next run omits it.
        let rec2 = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!rec2
            .aggregated
            .contributing
            .iter()
            .any(|s| s.strategy_name == "bollinger"));
    }

    #[tokio::test]
    async fn identical_inputs_serialize_identically() {
        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer);

        let instrument = Instrument::from_id("BTCUSDT");
        let a = engine
            .recommend(&instrument, when, &CancellationToken::new())
            .await
            .unwrap();
        let b = engine
            .recommend(&instrument, when, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn recommendation_wire_shape() {
        let candles = wave_candles(60);
        let when = as_of(&candles);
        let provider =
            Arc::new(FixtureProvider::new().with_series("BTCUSDT", Timeframe::D1, candles));
        let observer = Arc::new(RecordingObserver::new());
        let engine = engine_with(provider, standard_registry(), observer);

        let rec = engine
            .recommend(&Instrument::from_id("BTCUSDT"), when, &CancellationToken::new())
            .await
            .unwrap();
        let json = serde_json::to_value(&rec).unwrap();

        assert_eq!(json["instrument"], "BTCUSDT");
        assert!(json["as_of"].as_str().unwrap().ends_with('Z'));
        for field in ["action", "confidence", "valid_until", "invalidation"] {
            assert!(json["decision"].get(field).is_some(), "missing decision.{field}");
        }
        for field in ["direction", "strength", "consensus", "regime", "contributing"] {
            assert!(json["aggregated"].get(field).is_some(), "missing aggregated.{field}");
        }
        for field in ["summary", "reasons", "warnings"] {
            assert!(json["explanation"].get(field).is_some(), "missing explanation.{field}");
        }
        assert_eq!(json["engine_version"], ENGINE_VERSION);
        // Contributing entries do not leak the audit-only as_of.
        let first = &json["aggregated"]["contributing"][0];
        assert!(first.get("as_of").is_none());
    }
}
