//! Index-aligned downsampling for line series.
//!
//! The factor search always doubles (`2, 4, 8, …`) and bucket boundaries are
//! aligned to multiples of the factor relative to row 0, so two overlapping
//! queries downsampled at the same factor agree exactly on their overlapping
//! buckets — sliding the visible window in the UI must not make the resampled
//! curve wobble.

use bp_trace::RowSpan;

/// The smallest doubling factor that brings `len` rows down to at most
/// `max_points` buckets; `0` means no downsampling is needed.
pub fn factor(len: usize, max_points: usize) -> usize {
    let max_points = max_points.max(1);
    if len <= max_points {
        return 0;
    }
    let mut factor = 2;
    while len.div_ceil(factor) > max_points {
        factor *= 2;
    }
    factor
}

/// Expands `span` outwards to bucket boundaries: `first` down and `last` up
/// to the nearest multiples of `factor` (relative to row 0), clamped to the
/// table.
pub fn align(span: RowSpan, factor: usize, num_rows: usize) -> RowSpan {
    if factor <= 1 {
        return span;
    }
    let first = span.first - span.first % factor;
    let last = usize::min(span.last + (factor - 1 - span.last % factor), num_rows - 1);
    RowSpan::new(first, last)
}

/// One representative value per bucket: the first row's.
///
/// Used for the unit/time column, where any in-bucket timestamp is
/// acceptable.
pub fn first_of_bucket<T: Copy>(values: &[T], factor: usize) -> Vec<T> {
    if factor <= 1 {
        return values.to_vec();
    }
    values.chunks(factor).map(|bucket| bucket[0]).collect()
}

/// The mean of each bucket, weighting every row equally; the final partial
/// bucket is normalized by its actual row count.
pub fn mean_of_bucket(values: &[f64], factor: usize) -> Vec<f64> {
    if factor <= 1 {
        return values.to_vec();
    }
    values
        .chunks(factor)
        .map(|bucket| bucket.iter().sum::<f64>() / bucket.len() as f64)
        .collect()
}

/// Drops masked-out rows before bucketing.
///
/// Filtered series are bucketed by output index over the surviving rows, not
/// by original time distance; with unevenly distributed filtered rows this
/// compresses the time axis unevenly. Known, preserved behavior.
pub fn compact<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
    debug_assert_eq!(values.len(), mask.len());
    values
        .iter()
        .zip(mask)
        .filter_map(|(value, keep)| keep.then_some(*value))
        .collect()
}

// ---
