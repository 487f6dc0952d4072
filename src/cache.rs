// =============================================================================
// Recommendation Cache, single-flight with TTL
// =============================================================================
//
// Keyed by (instrument, timeframe, bar-truncated as_of) so every call inside
// the same bar shares one entry. Per key, at most one builder is ever in
// flight: the first caller on an empty slot becomes the builder and everyone
// else waits on a watch channel for the published result. Builder failures
// (including cancellation) clear the slot so the next caller starts fresh.
//
// Locking: one mutex over the slot map, held only for bookkeeping. The
// builder itself always runs outside the lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::engine::{EngineError, Recommendation};
use crate::observer::{EngineEvent, Observer};
use crate::types::Timeframe;

/// Cache key; `bar_ts` is `as_of` truncated to the decision timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub bar_ts: DateTime<Utc>,
}

impl CacheKey {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, as_of: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            bar_ts: timeframe.truncate(as_of),
        }
    }

    fn label(&self) -> String {
        format!("{}@{}:{}", self.instrument, self.timeframe, self.bar_ts.timestamp())
    }
}

type BuildResult = Result<Arc<Recommendation>, EngineError>;

enum Slot {
    /// A build is in flight; waiters subscribe to the receiver.
    Building(watch::Receiver<Option<BuildResult>>),
    /// A published value plus its insertion instant for TTL checks.
    Ready {
        value: Arc<Recommendation>,
        inserted_at: Instant,
    },
}

enum Plan {
    Hit(Arc<Recommendation>),
    Wait(watch::Receiver<Option<BuildResult>>),
    Build {
        tx: watch::Sender<Option<BuildResult>>,
        rx: watch::Receiver<Option<BuildResult>>,
    },
}

pub struct RecommendationCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    ttl: Duration,
    observer: Arc<dyn Observer>,
}

impl RecommendationCache {
    pub fn new(ttl: Duration, observer: Arc<dyn Observer>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            observer,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, join an in-flight build, or run
    /// `builder` exactly once and publish its result to every waiter.
    pub async fn get_or_build<F, Fut>(&self, key: CacheKey, builder: F) -> BuildResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Recommendation, EngineError>>,
    {
        let mut builder = Some(builder);
        loop {
            let plan = self.plan(&key);
            match plan {
                Plan::Hit(value) => {
                    self.observer.on_event(&EngineEvent::CacheHit { key: key.label() });
                    return Ok(value);
                }
                Plan::Wait(mut rx) => {
                    loop {
                        let published = rx.borrow().clone();
                        if let Some(result) = published {
                            return result;
                        }
                        if rx.changed().await.is_err() {
                            // The builder was dropped without publishing;
                            // re-enter and take over the slot.
                            break;
                        }
                    }
                }
                Plan::Build { tx, rx } => {
                    self.observer.on_event(&EngineEvent::CacheMiss { key: key.label() });
                    let Some(builder) = builder.take() else {
                        return Err(EngineError::Internal(
                            "cache builder invoked twice for one call".into(),
                        ));
                    };
                    let result: BuildResult = builder().await.map(Arc::new);
                    self.publish(&key, &rx, &result);
                    // Waking waiters after the map update means a woken
                    // waiter re-entering get_or_build sees the final state.
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    /// Decide what this caller does, under the map lock.
    fn plan(&self, key: &CacheKey) -> Plan {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Ready { value, inserted_at }) if inserted_at.elapsed() <= self.ttl => {
                Plan::Hit(Arc::clone(value))
            }
            Some(Slot::Building(rx)) => {
                let alive = rx.borrow().is_some() || rx.has_changed().is_ok();
                if alive {
                    Plan::Wait(rx.clone())
                } else {
                    // Abandoned build (builder future dropped). Take over.
                    let (tx, rx) = watch::channel(None);
                    slots.insert(key.clone(), Slot::Building(rx.clone()));
                    Plan::Build { tx, rx }
                }
            }
            // Empty or expired.
            _ => {
                let (tx, rx) = watch::channel(None);
                slots.insert(key.clone(), Slot::Building(rx.clone()));
                Plan::Build { tx, rx }
            }
        }
    }

    /// Publish the build outcome: success becomes Ready, failure clears the
    /// slot. Both only apply if the slot still belongs to this build (an
    /// invalidate may have dropped it, and a newer build may own it now).
    fn publish(&self, key: &CacheKey, our_rx: &watch::Receiver<Option<BuildResult>>, result: &BuildResult) {
        let mut slots = self.slots.lock();
        let owned = matches!(
            slots.get(key),
            Some(Slot::Building(rx)) if rx.same_channel(our_rx)
        );
        if !owned {
            return;
        }
        match result {
            Ok(value) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready {
                        value: Arc::clone(value),
                        inserted_at: Instant::now(),
                    },
                );
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    /// Drop every slot for `instrument`. In-flight waiters still observe
    /// whatever their builder publishes; subsequent calls start fresh.
    pub fn invalidate(&self, instrument: &str) {
        self.slots.lock().retain(|key, _| key.instrument != instrument);
    }

    /// Number of Ready entries currently held (diagnostics).
    pub fn ready_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }
}
