// =============================================================================
// Polaris Advisor, main entry point
// =============================================================================
//
// Wires configuration, the market data provider, the recommendation pipeline,
// the REST API server, and the daily scheduler. The shipped provider serves
// deterministic demo data; a deployment swaps in its own implementation of
// `MarketDataProvider` behind the same seam.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use polaris_advisor::api;
use polaris_advisor::app_state::AppState;
use polaris_advisor::config::Config;
use polaris_advisor::market_data::{Candle, FixtureProvider};
use polaris_advisor::observer::LogObserver;
use polaris_advisor::scheduler::DailyScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("POLARIS_CONFIG").unwrap_or_else(|_| "advisor_config.json".into());
    let mut config = Config::load(&config_path).unwrap_or_else(|err| {
        warn!(error = %err, "failed to load config, using defaults");
        Config::default()
    });

    // Override the tracked set from the environment if provided.
    if let Ok(ids) = std::env::var("POLARIS_INSTRUMENTS") {
        config.tracked_instruments = ids
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.tracked_instruments.is_empty() {
        config.tracked_instruments = Config::default().tracked_instruments;
    }

    info!(
        instruments = ?config.tracked_instruments,
        timeframe = %config.decision_timeframe,
        scheduler_times = ?config.scheduler_times,
        "Polaris advisor starting"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let observer = Arc::new(LogObserver);
    let provider = Arc::new(demo_provider(&config));
    let state = AppState::new(&config, provider, observer.clone());

    // ── 3. Start the API server ──────────────────────────────────────────
    let bind_addr =
        std::env::var("POLARIS_BIND_ADDR").unwrap_or_else(|_| config.bind_addr.clone());
    let app = api::router(state.clone(), &config.cors_origins);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "API server failed");
        }
    });

    // ── 4. Start the daily scheduler ─────────────────────────────────────
    let scheduler = DailyScheduler::new(
        state.engine.clone(),
        state.cache.clone(),
        state.instruments.clone(),
        observer,
        config.scheduler_config(),
    );
    scheduler.start()?;

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping");
    if let Err(err) = scheduler.stop().await {
        warn!(error = %err, "scheduler did not stop cleanly");
    }
    info!("Polaris advisor shut down");
    Ok(())
}

/// Deterministic synthetic candle provider for the demo wiring: a few hundred
/// bars per tracked instrument, ending at the current bar boundary. Price
/// paths differ per instrument but are stable across restarts.
fn demo_provider(config: &Config) -> FixtureProvider {
    const BARS: usize = 400;

    let timeframe = config.decision_timeframe;
    let end = timeframe.truncate(Utc::now());
    let step = timeframe.one_bar();

    let mut provider = FixtureProvider::new();
    for id in &config.tracked_instruments {
        let seed: u64 = id.bytes().map(u64::from).sum();
        let base = 50.0 + (seed % 500) as f64 * 20.0;

        let mut candles = Vec::with_capacity(BARS);
        let mut prev_close = base;
        for i in 0..BARS {
            let t = i as f64;
            let phase = (seed % 7) as f64;
            let close = base
                * (1.0
                    + 0.04 * ((t * 0.13 + phase).sin())
                    + 0.015 * ((t * 0.41 + phase * 2.0).sin()));
            let open = prev_close;
            let spread = base * 0.006;
            let candle = Candle {
                ts: end - step * ((BARS - i) as i32),
                open,
                high: open.max(close) + spread,
                low: open.min(close) - spread,
                close,
                volume: 100.0 + 40.0 * ((t * 0.29 + phase).sin().abs()),
            };
            candles.push(candle);
            prev_close = close;
        }
        provider = provider.with_series(id.clone(), timeframe, candles);
    }
    provider
}
