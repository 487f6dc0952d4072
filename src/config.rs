// =============================================================================
// Configuration
// =============================================================================
//
// The settings struct the core receives from the outside. The binary loads it
// from a JSON file; every field carries a serde default so older files keep
// deserialising after new fields appear. The core never reads files or
// environment variables itself.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decision::DecisionThresholds;
use crate::scheduler::SchedulerConfig;
use crate::types::{Instrument, Timeframe};

// =============================================================================
// Default-value helpers (required by serde `default = "..."`)
// =============================================================================

fn default_instruments() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_strategy_set() -> Vec<StrategyConfig> {
    ["rsi", "macd_histogram", "bollinger"]
        .into_iter()
        .map(|name| StrategyConfig {
            name: name.to_string(),
            enabled: true,
            weight: 1.0,
        })
        .collect()
}

fn default_scheduler_times() -> Vec<String> {
    vec!["00:05".to_string()]
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

// =============================================================================
// Config
// =============================================================================

/// Per-strategy activation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Top-level configuration of the advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instrument ids the advisor tracks and refreshes.
    #[serde(default = "default_instruments")]
    pub tracked_instruments: Vec<String>,

    /// Bar length of the decision pipeline; also drives `valid_until`,
    /// cache-key truncation, and the default cache TTL.
    #[serde(default)]
    pub decision_timeframe: Timeframe,

    /// Strategies to register at startup with their initial state.
    #[serde(default = "default_strategy_set")]
    pub strategy_set: Vec<StrategyConfig>,

    /// Recommendation cache TTL in seconds; 0 means one decision bar.
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// UTC times of day ("HH:MM") at which the scheduler refreshes all
    /// tracked instruments.
    #[serde(default = "default_scheduler_times")]
    pub scheduler_times: Vec<String>,

    /// Per-run timeout for scheduled refreshes, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Maximum concurrent scheduled runs; 0 means the CPU core count.
    #[serde(default)]
    pub bounded_parallelism: usize,

    /// Allowed CORS origins; empty means any origin (without credentials).
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// HTTP bind address of the API server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Decision generator cutoffs and ATR multipliers.
    #[serde(default)]
    pub thresholds: DecisionThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracked_instruments: default_instruments(),
            decision_timeframe: Timeframe::default(),
            strategy_set: default_strategy_set(),
            cache_ttl_secs: 0,
            scheduler_times: default_scheduler_times(),
            run_timeout_secs: default_run_timeout_secs(),
            bounded_parallelism: 0,
            cors_origins: Vec::new(),
            bind_addr: default_bind_addr(),
            thresholds: DecisionThresholds::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing files are an error so
    /// the caller can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            instruments = ?config.tracked_instruments,
            timeframe = %config.decision_timeframe,
            "config loaded"
        );
        Ok(config)
    }

    /// Tracked instruments as full records.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.tracked_instruments
            .iter()
            .map(Instrument::from_id)
            .collect()
    }

    /// Cache TTL: the configured value, or one decision bar when unset.
    pub fn cache_ttl(&self) -> Duration {
        if self.cache_ttl_secs > 0 {
            Duration::from_secs(self.cache_ttl_secs)
        } else {
            Duration::from_secs(self.decision_timeframe.bar_seconds() as u64)
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Scheduler times parsed to `NaiveTime`; malformed entries are logged
    /// and skipped.
    pub fn schedule_times(&self) -> Vec<NaiveTime> {
        self.scheduler_times
            .iter()
            .filter_map(|raw| match NaiveTime::parse_from_str(raw, "%H:%M") {
                Ok(time) => Some(time),
                Err(err) => {
                    warn!(time = %raw, error = %err, "ignoring malformed scheduler time");
                    None
                }
            })
            .collect()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            times: self.schedule_times(),
            run_timeout: self.run_timeout(),
            parallelism: if self.bounded_parallelism > 0 {
                self.bounded_parallelism
            } else {
                defaults.parallelism
            },
            grace_period: defaults.grace_period,
        }
    }
}
