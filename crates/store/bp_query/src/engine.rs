//! The engine facade: the query surface the presentation layer talks to.

use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;

use bp_trace::{TraceDataset, UnitKind};

use crate::bins::ValueTransform;
use crate::cache::{CacheStats, HeatmapKey, QueryCaches};
use crate::filter::{BranchFilter, FilterSpec};
use crate::heatmap::{HeatMap, HeatMapGenerator, HeatmapMode};
use crate::line::LinePlot;
use crate::profile::BranchProfile;

/// Engine tuning knobs.
///
/// See [`Self::const_default`] for defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Secondary rows per precomputed bin.
    ///
    /// Smaller bins mean finer-grained range queries at the cost of more
    /// precomputation memory; a range-sum touches `O(range / bin_size)` bins
    /// plus at most `2 * bin_size` boundary rows.
    pub bin_size: usize,

    /// Entries per query cache (soft bound, see `cache`).
    pub cache_capacity: usize,

    /// Idle interval after which a cache entry starts expiring.
    pub cache_expiry: Duration,

    /// Point budget per line series when the caller does not pass one.
    pub max_line_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::const_default()
    }
}

impl EngineConfig {
    pub const fn const_default() -> Self {
        Self {
            bin_size: 64 * 1024,
            cache_capacity: 32,
            cache_expiry: Duration::from_secs(10),
            max_line_points: 4096,
        }
    }
}

/// Row counts and cache occupancy, for the UI's status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    pub num_events: usize,
    pub num_updates: usize,
    pub num_cells: usize,
    pub built_generators: usize,
    pub caches: CacheStats,
}

/// The analytics engine over one loaded trace.
///
/// All query methods take `&self` and are safe to call from several threads:
/// aggregation state is immutable once built, and the caches synchronize
/// internally.
pub struct Engine {
    dataset: Arc<TraceDataset>,
    config: EngineConfig,
    caches: QueryCaches,

    /// Lazily built aggregation state, one per `(stat, transform)`.
    generators: Mutex<HashMap<(String, ValueTransform), Arc<HeatMapGenerator>>>,
}

impl Engine {
    pub fn new(dataset: Arc<TraceDataset>, config: EngineConfig) -> Self {
        Self {
            dataset,
            caches: QueryCaches::new(config.cache_capacity, config.cache_expiry),
            config,
            generators: Mutex::new(HashMap::default()),
        }
    }

    #[inline]
    pub fn dataset(&self) -> &Arc<TraceDataset> {
        &self.dataset
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            num_events: self.dataset.primary().num_rows(),
            num_updates: self.dataset.secondary().num_rows(),
            num_cells: self.dataset.geometry().num_cells(),
            built_generators: self.generators.lock().len(),
            caches: self.caches.stats(),
        }
    }

    pub fn purge_caches(&self) {
        self.caches.purge();
    }

    /// A downsampled line plot over `[first, last]` in the given unit system:
    /// one output row of unit values plus one row per resolved stat name
    /// (trailing-`*` wildcards expand in schema order).
    ///
    /// `max_points` of 0 means the configured default budget.
    pub fn get_line_points(
        &self,
        first: u64,
        last: u64,
        unit: UnitKind,
        stat_names: &[String],
        max_points: usize,
        filter: Option<&FilterSpec>,
    ) -> crate::Result<LinePlot> {
        let filter = compile_filter(filter)?;
        let max_points = if max_points == 0 {
            self.config.max_line_points
        } else {
            max_points
        };
        crate::line::generate(
            &self.dataset,
            &self.caches,
            first,
            last,
            unit,
            stat_names,
            max_points,
            filter.as_ref(),
        )
    }

    /// A heatmap of `stat` over `[first, last]`, one cell per
    /// `(table, bank, row)` coordinate of the predictor geometry.
    ///
    /// With a filter, `Sum` falls back to a masked scan (bins cannot see
    /// per-row identity) and the coalescing modes are rejected.
    pub fn get_heatmap(
        &self,
        first: u64,
        last: u64,
        unit: UnitKind,
        stat: &str,
        transform: ValueTransform,
        mode: HeatmapMode,
        allow_bins: bool,
        filter: Option<&FilterSpec>,
    ) -> crate::Result<HeatMap> {
        let span = self.dataset.primary().rows_in_range(first, last, unit)?;
        let filter = compile_filter(filter)?;
        if filter.is_some() && mode != HeatmapMode::Sum {
            return Err(crate::filter::MalformedFilterError(format!(
                "branch filters are not supported in {mode} mode"
            ))
            .into());
        }
        let generator = self.generator(stat, transform)?;

        let key = HeatmapKey {
            stat: generator.column(),
            transform,
            mode,
            span,
            allow_bins,
            filter: filter.clone(),
        };
        let cells = {
            let cached = self.caches.heatmaps.lock().get(&key);
            match cached {
                Some(cells) => cells,
                None => {
                    let mask = filter
                        .as_ref()
                        .map(|filter| self.caches.mask_for(&self.dataset, filter, span));
                    let cells = generator.generate(
                        &self.dataset,
                        span,
                        mode,
                        allow_bins,
                        mask.as_ref().map(|mask| (mask.as_slice(), span.first)),
                    )?;
                    self.caches.heatmaps.lock().insert(key, cells)
                }
            }
        };

        Ok(HeatMap {
            stat: generator.stat().to_owned(),
            mode,
            geometry: *self.dataset.geometry(),
            cells,
        })
    }

    /// Per-branch aggregates over `[first, last]`, sorted by occurrence count
    /// descending.
    pub fn get_branch_profile(
        &self,
        first: u64,
        last: u64,
        unit: UnitKind,
        filter: Option<&FilterSpec>,
    ) -> crate::Result<Vec<BranchProfile>> {
        let filter = compile_filter(filter)?;
        crate::profile::generate(&self.dataset, first, last, unit, filter.as_ref())
    }

    /// The aggregation state for `(stat, transform)`, building it on first
    /// use.
    fn generator(
        &self,
        stat: &str,
        transform: ValueTransform,
    ) -> crate::Result<Arc<HeatMapGenerator>> {
        let mut generators = self.generators.lock();
        if let Some(generator) = generators.get(&(stat.to_owned(), transform)) {
            return Ok(Arc::clone(generator));
        }

        let generator = Arc::new(HeatMapGenerator::build(
            &self.dataset,
            stat,
            transform,
            self.config.bin_size,
        )?);
        generators.insert((stat.to_owned(), transform), Arc::clone(&generator));
        Ok(generator)
    }
}

/// Compiles a filter spec, dropping it entirely when it has no predicates
/// (the fast pass-all path never allocates masks or perturbs cache keys).
fn compile_filter(filter: Option<&FilterSpec>) -> crate::Result<Option<Arc<BranchFilter>>> {
    match filter {
        None => Ok(None),
        Some(spec) if spec.is_empty() => Ok(None),
        Some(spec) => Ok(Some(Arc::new(BranchFilter::compile(spec.clone())?))),
    }
}
