// =============================================================================
// Observer seam for engine lifecycle events
// =============================================================================
//
// The core reports what it does through an injected observer and assumes
// nothing about where the events go. The default implementation forwards to
// `tracing`; tests swap in a recording observer to assert on behavior.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::types::Action;

/// Lifecycle events emitted by the engine, cache, and scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    EngineRunStarted {
        instrument: String,
        as_of: DateTime<Utc>,
    },
    EngineRunFinished {
        instrument: String,
        as_of: DateTime<Utc>,
        action: Action,
        elapsed_ms: u64,
    },
    StrategyFailed {
        instrument: String,
        strategy: String,
        error: String,
    },
    CacheHit {
        key: String,
    },
    CacheMiss {
        key: String,
    },
    SchedulerTickSummary {
        succeeded: usize,
        failed: usize,
        timed_out: usize,
    },
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Default observer: structured log lines via `tracing`.
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::EngineRunStarted { instrument, as_of } => {
                debug!(instrument = %instrument, as_of = %as_of, "engine run started");
            }
            EngineEvent::EngineRunFinished {
                instrument,
                as_of,
                action,
                elapsed_ms,
            } => {
                info!(
                    instrument = %instrument,
                    as_of = %as_of,
                    action = %action,
                    elapsed_ms,
                    "engine run finished"
                );
            }
            EngineEvent::StrategyFailed {
                instrument,
                strategy,
                error,
            } => {
                warn!(instrument = %instrument, strategy = %strategy, error = %error, "strategy failed");
            }
            EngineEvent::CacheHit { key } => {
                debug!(key = %key, "recommendation cache hit");
            }
            EngineEvent::CacheMiss { key } => {
                debug!(key = %key, "recommendation cache miss");
            }
            EngineEvent::SchedulerTickSummary {
                succeeded,
                failed,
                timed_out,
            } => {
                info!(succeeded, failed, timed_out, "scheduler tick summary");
            }
        }
    }
}

/// Records every event; used by tests to assert on engine behavior.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &EngineEvent) {
        self.events.lock().push(event.clone());
    }
}
