//! The temporal query cache.
//!
//! A small, capacity-bounded cache with *not-recently-used* eviction: entries
//! expire on wall-clock idle time instead of strict LRU order. The cache sits
//! in front of expensive per-query recomputation for a handful of
//! concurrently visible plots, and the access pattern over those is
//! round-robin — so when full, it prefers refusing a new insert over evicting
//! an entry that is still fresh.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;
use web_time::Instant;

use bp_trace::{RowSpan, TraceDataset, UnitKind};

use crate::bins::ValueTransform;
use crate::filter::BranchFilter;
use crate::heatmap::HeatmapMode;

// ---

struct CacheEntry<V> {
    value: Arc<V>,
    last_access: Instant,

    /// Set once the entry has sat idle for a full expiry interval; a second
    /// full interval, untouched, leads to actual removal.
    expiring: bool,
}

/// A capacity-bounded NRU cache.
///
/// Not internally synchronized; see [`QueryCaches`] for the mutex-wrapped
/// instances the engine shares between query threads.
pub struct TemporalCache<K, V> {
    capacity: usize,
    expiry: Duration,
    last_sweep: Instant,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Clone + Eq + Hash, V> TemporalCache<K, V> {
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        Self {
            capacity,
            expiry,
            last_sweep: Instant::now(),
            entries: HashMap::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge(&mut self) {
        self.entries.clear();
    }

    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        self.get_at(key, Instant::now())
    }

    /// Caches `value` if there is room for it, and returns it `Arc`-wrapped
    /// either way.
    ///
    /// When the cache is full and nothing is marked expiring, the insert is
    /// *refused* (silently, by design) and every current entry is aged by a
    /// fifth of the expiry interval instead, so that capacity is more likely
    /// to free up on the next sweep.
    pub fn insert(&mut self, key: K, value: V) -> Arc<V> {
        self.insert_at(key, value, Instant::now())
    }

    pub(crate) fn get_at(&mut self, key: &K, now: Instant) -> Option<Arc<V>> {
        // Touch before sweeping, so an access always saves the entry from an
        // overdue sweep.
        let hit = self.entries.get_mut(key).map(|entry| {
            entry.last_access = now;
            entry.expiring = false;
            Arc::clone(&entry.value)
        });
        self.sweep_at(now);
        hit
    }

    pub(crate) fn insert_at(&mut self, key: K, value: V, now: Instant) -> Arc<V> {
        self.sweep_at(now);

        let value = Arc::new(value);

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = Arc::clone(&value);
            entry.last_access = now;
            entry.expiring = false;
            return value;
        }

        if self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .find_map(|(key, entry)| entry.expiring.then(|| key.clone()));

            let Some(victim) = victim else {
                // Refuse the insert: everything in here is still fresh, and
                // evicting a still-visible entry is worse than not caching
                // this one. Age everyone instead.
                let boost = self.expiry / 5;
                for entry in self.entries.values_mut() {
                    if let Some(aged) = entry.last_access.checked_sub(boost) {
                        entry.last_access = aged;
                    }
                }
                return value;
            };
            self.entries.remove(&victim);
        }

        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                last_access: now,
                expiring: false,
            },
        );
        value
    }

    /// Runs the two-phase expiry sweep, at most once per expiry interval.
    pub(crate) fn sweep_at(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sweep) < self.expiry {
            return;
        }
        self.last_sweep = now;

        let expiry = self.expiry;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            if now.saturating_duration_since(entry.last_access) < expiry {
                return true;
            }
            if entry.expiring {
                false
            } else {
                entry.expiring = true;
                entry.last_access = now;
                true
            }
        });

        let evicted = before - self.entries.len();
        if evicted > 0 {
            log::trace!("cache sweep evicted {evicted} idle entries");
        }
    }
}

// ---

/// Identifies a cached filter mask.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct MaskKey {
    pub filter: Arc<BranchFilter>,
    pub span: RowSpan,
}

/// One column of a line plot, as cached: either the unit column or a stat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SeriesColumn {
    Unit(UnitKind),
    Stat(usize),
}

/// Identifies one cached (possibly downsampled) line series.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct SeriesKey {
    pub column: SeriesColumn,
    pub span: RowSpan,
    pub factor: usize,
    pub filter: Option<Arc<BranchFilter>>,
}

/// Identifies one cached heatmap result.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct HeatmapKey {
    pub stat: usize,
    pub transform: ValueTransform,
    pub mode: HeatmapMode,
    pub span: RowSpan,
    pub allow_bins: bool,
    pub filter: Option<Arc<BranchFilter>>,
}

/// Entry counts per cache, for the UI's status line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub masks: usize,
    pub series: usize,
    pub heatmaps: usize,
}

/// The engine's shared caches.
///
/// Each cache is guarded by a single mutex held for the duration of any
/// lookup, insert or sweep; the cached values themselves are immutable once
/// published, so readers need no further synchronization.
pub struct QueryCaches {
    pub(crate) masks: Mutex<TemporalCache<MaskKey, Vec<bool>>>,
    pub(crate) series: Mutex<TemporalCache<SeriesKey, Vec<f64>>>,
    pub(crate) heatmaps: Mutex<TemporalCache<HeatmapKey, Vec<f64>>>,
}

impl QueryCaches {
    pub fn new(capacity: usize, expiry: Duration) -> Self {
        Self {
            masks: Mutex::new(TemporalCache::new(capacity, expiry)),
            series: Mutex::new(TemporalCache::new(capacity, expiry)),
            heatmaps: Mutex::new(TemporalCache::new(capacity, expiry)),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            masks: self.masks.lock().len(),
            series: self.series.lock().len(),
            heatmaps: self.heatmaps.lock().len(),
        }
    }

    pub fn purge(&self) {
        self.masks.lock().purge();
        self.series.lock().purge();
        self.heatmaps.lock().purge();
    }

    /// The boolean mask of `filter` over `span`, cached by filter identity:
    /// structurally identical filters share one mask.
    pub(crate) fn mask_for(
        &self,
        dataset: &TraceDataset,
        filter: &Arc<BranchFilter>,
        span: RowSpan,
    ) -> Arc<Vec<bool>> {
        let key = MaskKey {
            filter: Arc::clone(filter),
            span,
        };
        let mut masks = self.masks.lock();
        match masks.get(&key) {
            Some(mask) => mask,
            None => masks.insert(key, filter.make_mask(dataset, span)),
        }
    }
}

// ---
