//! Heatmap generation: orchestrates bins, coalesced bins and masks.

use std::sync::Arc;

use web_time::Instant;

use bp_trace::{Geometry, RowSpan, TraceDataset, UnknownStatError};

use crate::bins::{BinSet, ValueTransform, sum_scan};
use crate::coalesce::{CoalescedBinSet, diff_cells, last_values_scan};
use crate::filter::MalformedFilterError;

/// What a heatmap cell reports about its range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapMode {
    /// Sum of all transformed values written in the range.
    Sum,

    /// Last value written at or before the end of the range.
    Last,

    /// Last value written *before* the range: the state at its start.
    First,

    /// `Last − First`, unset cells reading as zero.
    Diff,
}

impl std::fmt::Display for HeatmapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => "sum".fmt(f),
            Self::Last => "last".fmt(f),
            Self::First => "first".fmt(f),
            Self::Diff => "diff".fmt(f),
        }
    }
}

/// One generated heatmap, with its geometry attached.
#[derive(Clone, Debug)]
pub struct HeatMap {
    pub stat: String,
    pub mode: HeatmapMode,
    pub geometry: Geometry,

    /// Flat cells, column-major: each `(table, bank)` column is one
    /// contiguous run of `geometry.num_rows` values.
    pub cells: Arc<Vec<f64>>,
}

impl HeatMap {
    /// Matrix width: one column per `(table, bank)` pair.
    #[inline]
    pub fn width(&self) -> usize {
        self.geometry.num_tables as usize * self.geometry.num_banks as usize
    }

    /// Matrix height: one row per storage row coordinate.
    #[inline]
    pub fn height(&self) -> usize {
        self.geometry.num_rows as usize
    }

    #[inline]
    pub fn value_at(&self, table: u16, bank: u16, row: u32) -> f64 {
        self.cells[self.geometry.cell_index(table, bank, row)]
    }

    /// The `[height][width]` row-major matrix the presentation layer plots.
    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        let (width, height) = (self.width(), self.height());
        (0..height)
            .map(|row| (0..width).map(|column| self.cells[column * height + row]).collect())
            .collect()
    }
}

/// Precomputed aggregation state for one `(stat, transform)` pair.
///
/// Building is the expensive, parallel part; a built generator is immutable
/// and safe for concurrent read-only queries.
pub struct HeatMapGenerator {
    stat: String,
    column: usize,
    transform: ValueTransform,
    bins: BinSet,
    coalesced: CoalescedBinSet,
}

impl HeatMapGenerator {
    pub fn build(
        dataset: &TraceDataset,
        stat: &str,
        transform: ValueTransform,
        bin_size: usize,
    ) -> crate::Result<Self> {
        let resolved = dataset.secondary().schema().resolve(stat)?;
        let [resolved] = resolved.as_slice() else {
            // A wildcard fanning out to several columns cannot feed a single
            // heatmap.
            return Err(UnknownStatError(stat.to_owned()).into());
        };

        let values = dataset.secondary().value_column(resolved.column);
        let started = Instant::now();
        let bins = BinSet::build(
            dataset.secondary(),
            dataset.geometry(),
            values,
            transform,
            bin_size,
        )?;
        let coalesced = CoalescedBinSet::build(
            dataset.secondary(),
            dataset.geometry(),
            values,
            transform,
            bin_size,
        )?;
        log::debug!(
            "built {} bins for stat {:?} ({:?}) in {:.1?}",
            bins.num_bins(),
            resolved.name,
            transform,
            started.elapsed()
        );

        Ok(Self {
            stat: resolved.name.clone(),
            column: resolved.column,
            transform,
            bins,
            coalesced,
        })
    }

    #[inline]
    pub fn stat(&self) -> &str {
        &self.stat
    }

    #[inline]
    pub(crate) fn column(&self) -> usize {
        self.column
    }

    /// Computes the flat cell array for a mapped primary row span.
    ///
    /// `mask` (indexed by primary row, offset by its second element) is only
    /// meaningful for [`HeatmapMode::Sum`]: summed bins do not track per-row
    /// identity, so a mask forces the direct scan; the coalescing modes do
    /// not support filtering at all.
    pub fn generate(
        &self,
        dataset: &TraceDataset,
        primary_span: RowSpan,
        mode: HeatmapMode,
        allow_bins: bool,
        mask: Option<(&[bool], usize)>,
    ) -> crate::Result<Vec<f64>> {
        let secondary = dataset.secondary();
        let geometry = dataset.geometry();
        let values = secondary.value_column(self.column);
        let num_cells = geometry.num_cells();

        if mask.is_some() && mode != HeatmapMode::Sum {
            return Err(MalformedFilterError(format!(
                "branch filters are not supported in {mode} mode"
            ))
            .into());
        }

        // State at the end of the range (exclusive cursor), and at its start.
        let last_cells = |up_to_exclusive: usize| -> Vec<f64> {
            if up_to_exclusive == 0 {
                vec![f64::NAN; num_cells]
            } else if allow_bins {
                self.coalesced.last_values(
                    secondary,
                    geometry,
                    values,
                    self.transform,
                    up_to_exclusive - 1,
                )
            } else {
                last_values_scan(
                    secondary,
                    geometry,
                    values,
                    self.transform,
                    up_to_exclusive - 1,
                )
            }
        };

        let cells = match mode {
            HeatmapMode::Sum => match dataset.secondary_span(primary_span) {
                None => vec![0.0; num_cells],
                Some(span) if mask.is_none() && allow_bins => {
                    self.bins
                        .range_sum(secondary, geometry, values, self.transform, span)
                }
                Some(span) => sum_scan(secondary, geometry, values, self.transform, span, mask),
            },
            HeatmapMode::Last => last_cells(dataset.secondary_end(primary_span)),
            HeatmapMode::First => last_cells(dataset.secondary_range(primary_span.first).start),
            HeatmapMode::Diff => {
                let last = last_cells(dataset.secondary_end(primary_span));
                let first = last_cells(dataset.secondary_range(primary_span.first).start);
                diff_cells(&last, &first)
            }
        };

        Ok(cells)
    }
}

// ---
