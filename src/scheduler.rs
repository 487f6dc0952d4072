// =============================================================================
// Daily Scheduler
// =============================================================================
//
// Cooperative periodic driver: at each configured UTC time of day it refreshes
// the recommendation for every tracked instrument. Runs go through the
// cache's single-flight guard, so a scheduled refresh and a concurrent API
// call coalesce into one engine run.
//
// Per tick: bounded parallelism via a semaphore, a per-run timeout enforced
// by cancelling that run's token, and failure isolation per instrument. The
// tick summary (succeeded / failed / timed out) goes to the observer.
//
// State machine: Idle -> Running -> Stopping -> Stopped. `stop` cancels
// in-flight runs cooperatively and waits up to a grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{CacheKey, RecommendationCache};
use crate::engine::{EngineError, RecommendationEngine};
use crate::observer::{EngineEvent, Observer};
use crate::types::Instrument;

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("scheduler cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl SchedulerState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// Counts for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// UTC times of day at which a tick fires.
    pub times: Vec<NaiveTime>,
    /// Per-run timeout, enforced by cancellation.
    pub run_timeout: Duration,
    /// Maximum concurrent engine runs per tick.
    pub parallelism: usize,
    /// How long `stop` waits for in-flight runs.
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            run_timeout: Duration::from_secs(60),
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            grace_period: Duration::from_secs(5),
        }
    }
}

pub struct DailyScheduler {
    engine: Arc<RecommendationEngine>,
    cache: Arc<RecommendationCache>,
    instruments: Vec<Instrument>,
    observer: Arc<dyn Observer>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    cancel: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DailyScheduler {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        cache: Arc<RecommendationCache>,
        instruments: Vec<Instrument>,
        observer: Arc<dyn Observer>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            cache,
            instruments,
            observer,
            config,
            state: Mutex::new(SchedulerState::Idle),
            cancel: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Begin firing at the configured times. Valid from Idle only.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if *state != SchedulerState::Idle {
                return Err(SchedulerError::InvalidState {
                    action: "start",
                    state: state.name(),
                });
            }
            *state = SchedulerState::Running;
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.run_loop().await;
        });
        *self.loop_handle.lock() = Some(handle);
        info!(times = ?self.config.times, "scheduler started");
        Ok(())
    }

    /// Run one tick immediately. Valid while Idle or Running.
    pub async fn trigger_now(&self) -> Result<TickSummary, SchedulerError> {
        let state = self.state();
        if !matches!(state, SchedulerState::Idle | SchedulerState::Running) {
            return Err(SchedulerError::InvalidState {
                action: "trigger",
                state: state.name(),
            });
        }
        Ok(self.run_tick().await)
    }

    /// Stop firing; cancel in-flight runs and wait up to the grace period.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Running | SchedulerState::Idle => {
                    *state = SchedulerState::Stopping;
                }
                _ => {
                    return Err(SchedulerError::InvalidState {
                        action: "stop",
                        state: state.name(),
                    })
                }
            }
        }

        self.cancel.cancel();
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.config.grace_period, handle)
                .await
                .is_err()
            {
                warn!("scheduler loop did not stop within the grace period");
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        info!("scheduler stopped");
        Ok(())
    }

    async fn run_loop(&self) {
        loop {
            let now = Utc::now();
            let Some(next) = next_fire_after(now, &self.config.times) else {
                // Empty schedule: nothing to do until stopped.
                self.cancel.cancelled().await;
                return;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {
                    self.run_tick().await;
                }
            }
        }
    }

    /// Refresh every tracked instrument with bounded parallelism.
    async fn run_tick(&self) -> TickSummary {
        let as_of = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut handles = Vec::with_capacity(self.instruments.len());

        for instrument in self.instruments.clone() {
            let engine = Arc::clone(&self.engine);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&semaphore);
            let run_timeout = self.config.run_timeout;
            let token = self.cancel.child_token();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return RunOutcome::Failed,
                };

                let key = CacheKey::new(&instrument.id, engine.timeframe(), as_of);
                let build = cache.get_or_build(key, || {
                    let engine = Arc::clone(&engine);
                    let token = token.clone();
                    let instrument = instrument.clone();
                    async move { engine.recommend(&instrument, as_of, &token).await }
                });

                match tokio::time::timeout(run_timeout, build).await {
                    Ok(Ok(_)) => RunOutcome::Succeeded,
                    Ok(Err(EngineError::Cancelled)) => RunOutcome::TimedOut,
                    Ok(Err(err)) => {
                        warn!(instrument = %instrument.id, error = %err, "scheduled run failed");
                        RunOutcome::Failed
                    }
                    Err(_) => {
                        // Cancel cooperatively; the abandoned build clears
                        // its cache slot.
                        token.cancel();
                        warn!(instrument = %instrument.id, "scheduled run timed out");
                        RunOutcome::TimedOut
                    }
                }
            }));
        }

        let mut summary = TickSummary::default();
        for handle in handles {
            match handle.await {
                Ok(RunOutcome::Succeeded) => summary.succeeded += 1,
                Ok(RunOutcome::TimedOut) => summary.timed_out += 1,
                _ => summary.failed += 1,
            }
        }

        self.observer.on_event(&EngineEvent::SchedulerTickSummary {
            succeeded: summary.succeeded,
            failed: summary.failed,
            timed_out: summary.timed_out,
        });
        summary
    }
}

enum RunOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

/// Earliest configured time-of-day strictly after `now`, today or tomorrow.
/// `None` when the schedule is empty.
pub fn next_fire_after(now: DateTime<Utc>, times: &[NaiveTime]) -> Option<DateTime<Utc>> {
    if times.is_empty() {
        return None;
    }
    let today = now.date_naive();
    let mut candidates: Vec<DateTime<Utc>> = Vec::with_capacity(times.len() * 2);
    for &time in times {
        for date in [today, today.succ_opt()?] {
            let fire = date.and_time(time).and_utc();
            if fire > now {
                candidates.push(fire);
            }
        }
    }
    candidates.into_iter().min()
}
