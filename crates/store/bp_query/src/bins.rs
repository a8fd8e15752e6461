//! Precomputed partial sums over the secondary index space.
//!
//! The secondary table is partitioned into consecutive bins of `bin_size`
//! rows; each bin stores, per heatmap cell, the sum of the transformed values
//! its rows wrote to that cell. An arbitrary range-sum query then touches
//! only the boundary rows plus `O(range / bin_size)` precomputed partials
//! instead of every row.

use rayon::prelude::*;

use bp_trace::{Geometry, RowSpan, SecondaryTable, ShapeInvariantError};

/// Per-row value transform applied before aggregation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    #[default]
    Identity,
    Abs,
    Square,
}

impl ValueTransform {
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::Abs => value.abs(),
            Self::Square => value * value,
        }
    }
}

/// The precomputed partial-sum bins for one `(stat, transform)` pair.
///
/// Immutable once built; safe to share between query threads.
pub struct BinSet {
    bin_size: usize,
    num_cells: usize,

    /// One flat heatmap per bin.
    bins: Vec<Vec<f64>>,
}

impl BinSet {
    /// Builds all bins, in parallel across bins.
    ///
    /// Each worker owns a disjoint slice of the secondary index space and
    /// writes only to its own output array, so there is no shared mutable
    /// state.
    pub fn build(
        secondary: &SecondaryTable,
        geometry: &Geometry,
        values: &[f64],
        transform: ValueTransform,
        bin_size: usize,
    ) -> Result<Self, ShapeInvariantError> {
        if bin_size == 0 {
            return Err(ShapeInvariantError("bin_size must be positive".to_owned()));
        }
        let num_rows = secondary.num_rows();
        if values.len() != num_rows {
            return Err(ShapeInvariantError(format!(
                "value column has {} rows, secondary table has {num_rows}",
                values.len()
            )));
        }

        let num_cells = geometry.num_cells();
        let num_bins = num_rows.div_ceil(bin_size);

        let bins: Vec<Vec<f64>> = (0..num_bins)
            .into_par_iter()
            .map(|bin| {
                let first = bin * bin_size;
                let last = usize::min(first + bin_size, num_rows) - 1;
                let mut cells = vec![0.0; num_cells];
                for update in first..=last {
                    let (table, bank, row) = secondary.coords(update);
                    cells[geometry.cell_index(table, bank, row)] += transform.apply(values[update]);
                }
                cells
            })
            .collect();

        if bins.len() != num_bins {
            return Err(ShapeInvariantError(format!(
                "built {} bins, expected {num_bins}",
                bins.len()
            )));
        }

        Ok(Self {
            bin_size,
            num_cells,
            bins,
        })
    }

    #[inline]
    pub fn bin_size(&self) -> usize {
        self.bin_size
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Sums `transform(value)` into a flat heatmap over an inclusive
    /// secondary row span, using whole bins wherever the span fully covers
    /// them and scanning rows only at the two boundaries.
    pub fn range_sum(
        &self,
        secondary: &SecondaryTable,
        geometry: &Geometry,
        values: &[f64],
        transform: ValueTransform,
        span: RowSpan,
    ) -> Vec<f64> {
        let mut cells = vec![0.0; self.num_cells];

        let mut update = span.first;
        while update <= span.last {
            let aligned = update % self.bin_size == 0;
            if aligned && update + self.bin_size - 1 <= span.last {
                for (cell, partial) in cells.iter_mut().zip(&self.bins[update / self.bin_size]) {
                    *cell += partial;
                }
                update += self.bin_size;
            } else {
                let (table, bank, row) = secondary.coords(update);
                cells[geometry.cell_index(table, bank, row)] += transform.apply(values[update]);
                update += 1;
            }
        }

        cells
    }
}

/// The non-binned reference path: a direct per-row scan.
///
/// Used when bins are disallowed, and for filtered sums (bins do not track
/// per-row identity, so a mask forces a scan). The mask, when present, is
/// indexed by *primary* row: `mask[owner - mask_first]`.
pub fn sum_scan(
    secondary: &SecondaryTable,
    geometry: &Geometry,
    values: &[f64],
    transform: ValueTransform,
    span: RowSpan,
    mask: Option<(&[bool], usize)>,
) -> Vec<f64> {
    let mut cells = vec![0.0; geometry.num_cells()];

    for update in span.iter() {
        if let Some((mask, mask_first)) = mask {
            let owner = secondary.owner(update);
            if !mask[owner - mask_first] {
                continue;
            }
        }
        let (table, bank, row) = secondary.coords(update);
        cells[geometry.cell_index(table, bank, row)] += transform.apply(values[update]);
    }

    cells
}

// ---
