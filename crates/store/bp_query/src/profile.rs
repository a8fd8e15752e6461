//! Per-branch profiles: which PCs dominate a range, and how they behave.

use std::sync::Arc;

use nohash_hasher::IntMap;

use bp_trace::{TraceDataset, UnitKind};

use crate::filter::BranchFilter;

/// Aggregated behavior of one distinct branch PC over a queried range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BranchProfile {
    pub pc: u64,

    /// Training events in the range.
    pub occurrences: u64,

    /// Of which: taken.
    pub taken: u64,

    /// Of which: mispredicted.
    pub mispredicts: u64,

    /// Weight-table updates attributed to this branch.
    pub updates: u64,
}

pub(crate) fn generate(
    dataset: &TraceDataset,
    first: u64,
    last: u64,
    unit: UnitKind,
    filter: Option<&Arc<BranchFilter>>,
) -> crate::Result<Vec<BranchProfile>> {
    let primary = dataset.primary();
    let span = primary.rows_in_range(first, last, unit)?;

    // Not every loader provides these stats; missing ones just read 0.
    let schema = primary.schema();
    let taken_column = schema.index_of("taken").map(|c| primary.stat_column(c));
    let mispredicted_column = schema
        .index_of("mispredicted")
        .map(|c| primary.stat_column(c));

    let mut per_pc: IntMap<u64, BranchProfile> = IntMap::default();
    for row in span.iter() {
        if let Some(filter) = filter {
            if !filter.accept(dataset, row) {
                continue;
            }
        }

        let profile = per_pc.entry(primary.pc(row)).or_insert_with(|| BranchProfile {
            pc: primary.pc(row),
            ..Default::default()
        });
        profile.occurrences += 1;
        if taken_column.is_some_and(|taken| taken[row] != 0.0) {
            profile.taken += 1;
        }
        if mispredicted_column.is_some_and(|mispredicted| mispredicted[row] != 0.0) {
            profile.mispredicts += 1;
        }
        profile.updates += dataset.secondary_range(row).len() as u64;
    }

    let mut profiles: Vec<BranchProfile> = per_pc.into_values().collect();
    profiles.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.pc.cmp(&b.pc))
    });
    Ok(profiles)
}

// ---
