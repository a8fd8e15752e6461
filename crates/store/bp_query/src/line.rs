//! Line-series generation: unit column + N stat columns, downsampled.

use std::sync::Arc;

use bp_trace::{RowSpan, TraceDataset, UnitKind};

use crate::cache::{QueryCaches, SeriesColumn, SeriesKey};
use crate::downsample;
use crate::filter::BranchFilter;

/// One generated line plot.
///
/// `rows[0]` is the unit value per output point; `rows[1 + i]` is the series
/// for `labels[i]`. All rows have the same length.
#[derive(Clone, Debug)]
pub struct LinePlot {
    pub unit: UnitKind,
    pub labels: Vec<String>,
    pub rows: Vec<Arc<Vec<f64>>>,

    /// The downsampling factor the series were reduced by; `0` means the
    /// output is exact (one point per event).
    pub downsample_factor: usize,
}

impl LinePlot {
    /// Number of output points per series.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }
}

pub(crate) fn generate(
    dataset: &TraceDataset,
    caches: &QueryCaches,
    first: u64,
    last: u64,
    unit: UnitKind,
    stat_names: &[String],
    max_points: usize,
    filter: Option<&Arc<BranchFilter>>,
) -> crate::Result<LinePlot> {
    let primary = dataset.primary();
    let span = primary.rows_in_range(first, last, unit)?;

    let mut resolved = Vec::new();
    for name in stat_names {
        resolved.extend(primary.schema().resolve(name)?);
    }

    let mask = match filter {
        Some(filter) if !filter.is_pass_all() => Some(caches.mask_for(dataset, filter, span)),
        _ => None,
    };

    let unit_values = |span: RowSpan| -> Vec<f64> {
        span.iter()
            .map(|row| primary.unit_value(row, unit) as f64)
            .collect()
    };

    let (factor, output_span, cache_filter) = match &mask {
        None => {
            let factor = downsample::factor(span.len(), max_points);
            let aligned = downsample::align(span, factor, primary.num_rows());
            (factor, aligned, None)
        }
        Some(mask) => {
            // Filtered series: masked rows are dropped before bucketing, and
            // bucket boundaries follow the compacted output index (no
            // cross-query alignment).
            let kept = mask.iter().filter(|keep| **keep).count();
            let factor = downsample::factor(kept, max_points);
            (factor, span, filter.map(Arc::clone))
        }
    };

    let compute_series = |column: SeriesColumn| -> Arc<Vec<f64>> {
        let key = SeriesKey {
            column,
            span: output_span,
            factor,
            filter: cache_filter.clone(),
        };
        let mut series = caches.series.lock();
        if let Some(cached) = series.get(&key) {
            return cached;
        }

        let values: Vec<f64> = match column {
            SeriesColumn::Unit(unit_kind) => {
                debug_assert!(unit_kind == unit);
                unit_values(output_span)
            }
            SeriesColumn::Stat(stat_column) => {
                primary.stat_column(stat_column)[output_span.first..=output_span.last].to_vec()
            }
        };
        let values = match &mask {
            Some(mask) => downsample::compact(&values, mask),
            None => values,
        };
        let reduced = match column {
            // Any representative in-bucket timestamp is fine for the unit
            // column; value columns get the properly weighted mean.
            SeriesColumn::Unit(_) => downsample::first_of_bucket(&values, factor),
            SeriesColumn::Stat(_) => downsample::mean_of_bucket(&values, factor),
        };
        series.insert(key, reduced)
    };

    let mut rows = Vec::with_capacity(1 + resolved.len());
    rows.push(compute_series(SeriesColumn::Unit(unit)));
    for stat in &resolved {
        rows.push(compute_series(SeriesColumn::Stat(stat.column)));
    }

    Ok(LinePlot {
        unit,
        labels: resolved.into_iter().map(|stat| stat.name).collect(),
        rows,
        downsample_factor: factor,
    })
}

// ---

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bp_trace::{UnitKind, testing};

    use super::generate;
    use crate::cache::QueryCaches;
    use crate::filter::{AddressMatcher, AddressPredicate, BranchFilter, FilterSpec};

    fn caches() -> QueryCaches {
        QueryCaches::new(16, Duration::from_secs(60))
    }

    #[test]
    fn exact_series_when_under_the_point_budget() {
        let dataset = testing::linear_dataset(32, 1);
        let caches = caches();

        let plot = generate(
            &dataset,
            &caches,
            0,
            1000,
            UnitKind::Cycles,
            &["taken".to_owned()],
            100,
            None,
        )
        .unwrap();

        assert_eq!(plot.downsample_factor, 0);
        assert_eq!(plot.num_points(), 32);
        assert_eq!(plot.labels, vec!["taken".to_owned()]);
        // Cycles are 10i+5.
        assert_eq!(plot.rows[0][0], 5.0);
        assert_eq!(plot.rows[0][31], 315.0);
        // taken alternates 0/1 starting at 0.
        assert_eq!(plot.rows[1][3], 1.0);
    }

    #[test]
    fn downsampled_series_are_aligned_across_overlapping_queries() {
        let dataset = testing::linear_dataset(256, 1);
        let caches = caches();
        let stats = vec!["confidence".to_owned()];

        // Both windows need factor 4 to fit 64 points; their buckets must
        // agree exactly on the overlap.
        let a = generate(
            &dataset,
            &caches,
            0,
            2000,
            UnitKind::Cycles,
            &stats,
            64,
            None,
        )
        .unwrap();
        let b = generate(
            &dataset,
            &caches,
            600,
            2500,
            UnitKind::Cycles,
            &stats,
            64,
            None,
        )
        .unwrap();
        assert_eq!(a.downsample_factor, 4);
        assert_eq!(b.downsample_factor, 4);

        // Cycle 600 ⇒ event 60, already on a bucket boundary; cycle 2000 ⇒
        // event 199, aligned up to 199 (200 rows ⇒ 50 buckets).
        let offset = 60 / 4;
        for bucket in 0..(a.num_points() - offset) {
            similar_asserts::assert_eq!(
                a.rows[1][offset + bucket],
                b.rows[1][bucket],
                "bucket {bucket} drifted"
            );
        }
    }

    #[test]
    fn wildcards_expand_to_multiple_series() {
        let dataset = testing::linear_dataset(16, 1);
        let caches = caches();

        let plot = generate(
            &dataset,
            &caches,
            0,
            1000,
            UnitKind::Events,
            &["mispredicted".to_owned(), "ta*".to_owned()],
            100,
            None,
        )
        .unwrap();
        assert_eq!(plot.labels, vec![
            "mispredicted".to_owned(),
            "taken".to_owned()
        ]);
        assert_eq!(plot.rows.len(), 3);
    }

    #[test]
    fn filtered_series_compact_before_bucketing() {
        let dataset = testing::linear_dataset(32, 1);
        let caches = caches();

        // Keep only the pc that every 4th event starting at 0 uses.
        let filter = Arc::new(
            BranchFilter::compile(FilterSpec {
                addresses: vec![AddressPredicate {
                    address: AddressMatcher::Address { addr: 0x0040_0000 },
                    include: true,
                    enabled: true,
                }],
                ..Default::default()
            })
            .unwrap(),
        );

        let plot = generate(
            &dataset,
            &caches,
            0,
            1000,
            UnitKind::Cycles,
            &["confidence".to_owned()],
            100,
            Some(&filter),
        )
        .unwrap();

        // 8 of 32 events survive; no downsampling needed.
        assert_eq!(plot.downsample_factor, 0);
        assert_eq!(plot.num_points(), 8);
        // The unit row only carries the surviving events' cycles.
        assert_eq!(plot.rows[0][0], 5.0);
        assert_eq!(plot.rows[0][1], 45.0);
        // confidence of events 0, 4, 8, … is (i % 7).
        assert_eq!(plot.rows[1][2], (8 % 7) as f64);
    }

    #[test]
    fn repeated_queries_hit_the_series_cache() {
        let dataset = testing::linear_dataset(64, 1);
        let caches = caches();
        let stats = vec!["taken".to_owned()];

        let a = generate(
            &dataset,
            &caches,
            0,
            1000,
            UnitKind::Cycles,
            &stats,
            16,
            None,
        )
        .unwrap();
        let cached = caches.stats().series;
        let b = generate(
            &dataset,
            &caches,
            0,
            1000,
            UnitKind::Cycles,
            &stats,
            16,
            None,
        )
        .unwrap();

        assert_eq!(caches.stats().series, cached, "no new cache entries");
        // The exact same buffers come back.
        assert!(Arc::ptr_eq(&a.rows[1], &b.rows[1]));
    }
}
