// =============================================================================
// Central Application State, Polaris advisor
// =============================================================================
//
// Ties the subsystems together for the API server and scheduler: the strategy
// registry, the recommendation engine, and the single-flight cache all hang
// off one `Arc<AppState>` shared across async tasks. Each subsystem manages
// its own interior mutability; AppState itself is immutable after startup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheKey, RecommendationCache};
use crate::config::Config;
use crate::engine::{EngineError, Recommendation, RecommendationEngine};
use crate::market_data::MarketDataProvider;
use crate::observer::Observer;
use crate::strategy::bollinger::BollingerBandsStrategy;
use crate::strategy::macd_histogram::MacdHistogramStrategy;
use crate::strategy::registry::StrategyRegistry;
use crate::strategy::rsi::RsiStrategy;
use crate::types::{Instrument, Timeframe};

/// Deadline for a single provider call inside one engine run.
const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub struct AppState {
    pub instruments: Vec<Instrument>,
    pub timeframe: Timeframe,
    pub registry: Arc<StrategyRegistry>,
    pub engine: Arc<RecommendationEngine>,
    pub cache: Arc<RecommendationCache>,
}

impl AppState {
    /// Wire the full pipeline from configuration, a provider, and an
    /// observer.
    pub fn new(
        config: &Config,
        provider: Arc<dyn MarketDataProvider>,
        observer: Arc<dyn Observer>,
    ) -> Arc<Self> {
        let registry = Arc::new(build_registry(config));
        let engine = Arc::new(RecommendationEngine::new(
            provider,
            registry.clone(),
            observer.clone(),
            config.decision_timeframe,
            config.thresholds,
            PROVIDER_TIMEOUT,
        ));
        let cache = Arc::new(RecommendationCache::new(config.cache_ttl(), observer));

        Arc::new(Self {
            instruments: config.instruments(),
            timeframe: config.decision_timeframe,
            registry,
            engine,
            cache,
        })
    }

    pub fn instrument(&self, id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    /// Serve the recommendation for `(instrument, as_of)` through the
    /// single-flight cache, building on miss.
    pub async fn recommendation(
        &self,
        instrument: &Instrument,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Arc<Recommendation>, EngineError> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let key = CacheKey::new(&instrument.id, self.timeframe, as_of);
        let engine = Arc::clone(&self.engine);
        let instrument = instrument.clone();
        self.cache
            .get_or_build(key, move || async move {
                let token = CancellationToken::new();
                engine.recommend(&instrument, as_of, &token).await
            })
            .await
    }

    /// Drop any cached entries for the instrument and rebuild now.
    pub async fn refresh(
        &self,
        instrument: &Instrument,
    ) -> Result<Arc<Recommendation>, EngineError> {
        self.cache.invalidate(&instrument.id);
        self.recommendation(instrument, None).await
    }
}

/// Build the registry from the configured strategy set. Unknown names are
/// logged and skipped so a typo disables one strategy instead of the process.
fn build_registry(config: &Config) -> StrategyRegistry {
    let registry = StrategyRegistry::new();
    for entry in &config.strategy_set {
        match entry.name.as_str() {
            RsiStrategy::NAME => registry.register(Arc::new(RsiStrategy::new())),
            MacdHistogramStrategy::NAME => {
                registry.register(Arc::new(MacdHistogramStrategy::new()))
            }
            BollingerBandsStrategy::NAME => {
                registry.register(Arc::new(BollingerBandsStrategy::new()))
            }
            other => {
                warn!(strategy = %other, "unknown strategy in config, skipping");
                continue;
            }
        }
        if let Err(err) = registry.apply_update(&entry.name, Some(entry.enabled), Some(entry.weight))
        {
            warn!(strategy = %entry.name, error = %err, "invalid strategy config, keeping defaults");
        }
        info!(
            strategy = %entry.name,
            enabled = entry.enabled,
            weight = entry.weight,
            "strategy registered"
        );
    }
    registry
}
