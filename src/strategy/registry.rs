// =============================================================================
// Strategy Registry
// =============================================================================
//
// Ordered, name-addressed collection of strategies plus their mutable runtime
// state (weight, enabled flag). Readers take value snapshots; an engine run
// works entirely off the snapshot it took at its start, so registry writes
// are only visible to runs started afterwards.
//
// Locking: parking_lot::RwLock over the entry list. Snapshots clone the
// entries (Arc clones for the strategies themselves), so no lock is held
// while a run evaluates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use super::{Strategy, StrategyMetadata};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy weight must be non-negative, got {0}")]
    NegativeWeight(f64),
}

/// One registered strategy plus its runtime state.
#[derive(Clone)]
pub struct RegistryEntry {
    pub strategy: Arc<dyn Strategy>,
    pub weight: f64,
    pub enabled: bool,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.strategy.metadata().name
    }
}

/// Immutable view of the registry handed to exactly one engine run.
#[derive(Clone)]
pub struct RegistrySnapshot {
    pub entries: Vec<RegistryEntry>,
    pub generation: u64,
}

impl RegistrySnapshot {
    /// Enabled entries in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    /// Largest history demand across enabled strategies; `None` when nothing
    /// is enabled.
    pub fn required_history(&self) -> Option<usize> {
        self.enabled().map(|e| e.strategy.required_history()).max()
    }
}

/// Serialisable record for the strategies API endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyRecord {
    pub name: String,
    pub enabled: bool,
    pub weight: f64,
    pub metadata: StrategyMetadata,
}

pub struct StrategyRegistry {
    entries: RwLock<Vec<RegistryEntry>>,
    generation: AtomicU64,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Register a strategy under its metadata name with its default weight,
    /// enabled. Registering an existing name replaces that entry in place
    /// (preserving its position) and bumps the generation counter.
    pub fn register(&self, strategy: Arc<dyn Strategy>) {
        let entry = RegistryEntry {
            weight: strategy.metadata().default_weight,
            enabled: true,
            strategy,
        };
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.name() == entry.name()) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_weight(&self, name: &str, weight: f64) -> Result<(), RegistryError> {
        if !(weight >= 0.0) {
            return Err(RegistryError::NegativeWeight(weight));
        }
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))?;
        entry.weight = weight;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))?;
        entry.enabled = enabled;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Apply an enabled/weight update as a single atomic write, returning the
    /// updated record. Used by the strategies API endpoint.
    pub fn apply_update(
        &self,
        name: &str,
        enabled: Option<bool>,
        weight: Option<f64>,
    ) -> Result<StrategyRecord, RegistryError> {
        if let Some(w) = weight {
            if !(w >= 0.0) {
                return Err(RegistryError::NegativeWeight(w));
            }
        }
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.name() == name)
            .ok_or_else(|| RegistryError::UnknownStrategy(name.to_string()))?;
        if let Some(e) = enabled {
            entry.enabled = e;
        }
        if let Some(w) = weight {
            entry.weight = w;
        }
        let record = StrategyRecord {
            name: entry.name().to_string(),
            enabled: entry.enabled,
            weight: entry.weight,
            metadata: entry.strategy.metadata().clone(),
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    /// Value snapshot for one engine run. Subsequent registry writes do not
    /// affect it.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            entries: self.entries.read().clone(),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Records for the strategies API endpoint, in registration order.
    pub fn records(&self) -> Vec<StrategyRecord> {
        self.entries
            .read()
            .iter()
            .map(|e| StrategyRecord {
                name: e.name().to_string(),
                enabled: e.enabled,
                weight: e.weight,
                metadata: e.strategy.metadata().clone(),
            })
            .collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
