//! Coalesced bins: per-bin "last touched value" arrays.
//!
//! Within one bin, later writes in index order always win, so a single
//! back-to-front scan per bin precomputes the last value written to every
//! cell inside it. A `last_value` query then walks rows backwards only until
//! it reaches a bin boundary, after which it merges whole precomputed bins —
//! skipping potentially millions of rows once every cell of interest has been
//! touched.
//!
//! Unset cells carry [`f64::NAN`] as the sentinel.

use bp_trace::{Geometry, SecondaryTable, ShapeInvariantError};

use crate::bins::ValueTransform;

/// The precomputed coalesced bins for one `(stat, transform)` pair.
///
/// Immutable once built; safe to share between query threads.
pub struct CoalescedBinSet {
    bin_size: usize,
    num_cells: usize,
    num_rows: usize,

    /// One flat heatmap per bin; `NAN` where the bin never wrote the cell.
    bins: Vec<Vec<f64>>,
}

impl CoalescedBinSet {
    /// Builds all coalesced bins, in parallel across bins.
    pub fn build(
        secondary: &SecondaryTable,
        geometry: &Geometry,
        values: &[f64],
        transform: ValueTransform,
        bin_size: usize,
    ) -> Result<Self, ShapeInvariantError> {
        use rayon::prelude::*;

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
                let mut cells = vec![f64::NAN; num_cells];
                // Back to front: the first write wins, which is the last in
                // index order.
                for update in (first..=last).rev() {
                    let (table, bank, row) = secondary.coords(update);
                    let cell = geometry.cell_index(table, bank, row);
                    if cells[cell].is_nan() {
                        cells[cell] = transform.apply(values[update]);
                    }
                }
                cells
            })
            .collect();

        Ok(Self {
            bin_size,
            num_cells,
            num_rows,
            bins,
        })
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// The last value written to each cell by any update in `[0, up_to]`;
    /// `NAN` where no update in that range touched the cell.
    ///
    /// Walks rows descending from `up_to`, merging a whole precomputed bin
    /// whenever the remaining search range fully covers it, and stops as soon
    /// as every cell is set.
    pub fn last_values(
        &self,
        secondary: &SecondaryTable,
        geometry: &Geometry,
        values: &[f64],
        transform: ValueTransform,
        up_to: usize,
    ) -> Vec<f64> {
        debug_assert!(up_to < self.num_rows);

        let mut cells = vec![f64::NAN; self.num_cells];
        let mut unset = self.num_cells;

        // Exclusive cursor: rows [0, cursor) remain to be searched.
        let mut cursor = up_to + 1;
        while cursor > 0 && unset > 0 {
            let update = cursor - 1;
            let bin = update / self.bin_size;
            let bin_first = bin * self.bin_size;
            let bin_last = usize::min(bin_first + self.bin_size, self.num_rows) - 1;

            if update == bin_last {
                // The whole bin lies inside the remaining range: merge its
                // precomputed values into every still-unset cell and jump
                // past it.
                for (cell, coalesced) in cells.iter_mut().zip(&self.bins[bin]) {
                    if cell.is_nan() && !coalesced.is_nan() {
                        *cell = *coalesced;
                        unset -= 1;
                    }
                }
                cursor = bin_first;
            } else {
                let (table, bank, row) = secondary.coords(update);
                let cell = geometry.cell_index(table, bank, row);
                if cells[cell].is_nan() {
                    cells[cell] = transform.apply(values[update]);
                    unset -= 1;
                }
                cursor -= 1;
            }
        }

        cells
    }
}

/// Reference implementation of [`CoalescedBinSet::last_values`]: a plain
/// backward linear scan. Used when bins are disallowed.
pub fn last_values_scan(
    secondary: &SecondaryTable,
    geometry: &Geometry,
    values: &[f64],
    transform: ValueTransform,
    up_to: usize,
) -> Vec<f64> {
    let mut cells = vec![f64::NAN; geometry.num_cells()];
    let mut unset = cells.len();

    for update in (0..=up_to).rev() {
        let (table, bank, row) = secondary.coords(update);
        let cell = geometry.cell_index(table, bank, row);
        if cells[cell].is_nan() {
            cells[cell] = transform.apply(values[update]);
            unset -= 1;
            if unset == 0 {
                break;
            }
        }
    }

    cells
}

/// Cell-wise `last − first`, treating unset (`NAN`) cells as zero.
pub fn diff_cells(last: &[f64], first: &[f64]) -> Vec<f64> {
    debug_assert_eq!(last.len(), first.len());
    let zero_if_unset = |v: f64| if v.is_nan() { 0.0 } else { v };
    last.iter()
        .zip(first)
        .map(|(l, f)| zero_if_unset(*l) - zero_if_unset(*f))
        .collect()
}

// ---
