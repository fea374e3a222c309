//! Bounded memoization of forecast results
//!
//! Entries are keyed by strategy, series fingerprint and horizon, and are
//! evicted strictly in insertion order once the capacity is reached. They
//! never expire by time.

use crate::models::{ForecastResult, StrategyKind};
use crate::series::ReturnSeries;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Default number of cached forecasts
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub strategy: StrategyKind,
    pub fingerprint: u64,
    pub horizon: usize,
}

impl CacheKey {
    pub fn new(strategy: StrategyKind, series: &ReturnSeries, horizon: usize) -> Self {
        Self {
            strategy,
            fingerprint: series.fingerprint(),
            horizon,
        }
    }
}

/// Storage for forecast results shared across requests
pub trait ForecastCache: fmt::Debug + Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<ForecastResult>;

    fn insert(&self, key: CacheKey, value: ForecastResult);

    /// Remove every entry
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}

#[derive(Debug, Default)]
struct FifoState {
    entries: HashMap<CacheKey, ForecastResult>,
    order: VecDeque<CacheKey>,
}

/// Capacity-bounded cache with first-in-first-out eviction
#[derive(Debug)]
pub struct FifoCache {
    capacity: usize,
    state: Mutex<FifoState>,
}

impl FifoCache {
    /// A zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(FifoState::default()),
        }
    }

    /// Keys from oldest to newest
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state.lock().order.iter().copied().collect()
    }
}

impl Default for FifoCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ForecastCache for FifoCache {
    fn get(&self, key: &CacheKey) -> Option<ForecastResult> {
        self.state.lock().entries.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, value: ForecastResult) {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get_mut(&key) {
            // replacing keeps the original insertion position
            *existing = value;
            return;
        }

        if state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                debug!(strategy = %oldest.strategy, horizon = oldest.horizon, "evicted oldest cached forecast");
            }
        }
        state.order.push_back(key);
        state.entries.insert(key, value);
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A cache that stores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ForecastCache for NoopCache {
    fn get(&self, _key: &CacheKey) -> Option<ForecastResult> {
        None
    }

    fn insert(&self, _key: CacheKey, _value: ForecastResult) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }
}
