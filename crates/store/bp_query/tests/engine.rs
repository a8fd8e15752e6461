use std::sync::Arc;
use std::time::Duration;

use bp_query::{
    AddressMatcher, AddressPredicate, Engine, EngineConfig, FilterSpec, HeatmapMode, QueryError,
    ValueTransform,
};
use bp_trace::{UnitKind, testing};

// ---

fn small_engine() -> Engine {
    bp_log::setup_logging();
    let config = EngineConfig {
        bin_size: 2,
        ..Default::default()
    };
    Engine::new(Arc::new(testing::small_dataset()), config)
}

fn linear_engine(num_events: usize, updates_per_event: usize, bin_size: usize) -> Engine {
    let config = EngineConfig {
        bin_size,
        ..Default::default()
    };
    Engine::new(
        Arc::new(testing::linear_dataset(num_events, updates_per_event)),
        config,
    )
}

fn heatmap_cells(
    engine: &Engine,
    first: u64,
    last: u64,
    mode: HeatmapMode,
    allow_bins: bool,
) -> Vec<f64> {
    engine
        .get_heatmap(
            first,
            last,
            UnitKind::Events,
            "weight",
            ValueTransform::Identity,
            mode,
            allow_bins,
            None,
        )
        .unwrap()
        .cells
        .to_vec()
}

#[track_caller]
fn assert_cells_eq(actual: &[f64], expected: &[f64]) {
    let eq = actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b);
    assert!(
        eq,
        "cells mismatch:\n  actual:   {actual:?}\n  expected: {expected:?}"
    );
}

const NAN: f64 = f64::NAN;

// ---

#[test]
fn last_state_heatmaps_over_the_small_trace() {
    let engine = small_engine();

    // All three events: state after update 8.
    assert_cells_eq(
        &heatmap_cells(&engine, 0, 2, HeatmapMode::Last, true),
        &[2.0, 8.0, 6.0, 3.0, 7.0, NAN],
    );

    // First two events: state after update 5.
    assert_cells_eq(
        &heatmap_cells(&engine, 0, 1, HeatmapMode::Last, true),
        &[1.0, 5.0, 6.0, 3.0, 7.0, NAN],
    );

    // `First` of a range starting at event 0 has seen nothing yet.
    assert_cells_eq(
        &heatmap_cells(&engine, 0, 2, HeatmapMode::First, true),
        &[NAN; 6],
    );
}

#[test]
fn sum_heatmaps_are_additive_and_path_independent() {
    let engine = linear_engine(60, 4, 16);
    let (a, b, c) = (0u64, 23u64, 59u64);

    for allow_bins in [true, false] {
        let whole = heatmap_cells(&engine, a, c, HeatmapMode::Sum, allow_bins);
        let left = heatmap_cells(&engine, a, b, HeatmapMode::Sum, allow_bins);
        let right = heatmap_cells(&engine, b + 1, c, HeatmapMode::Sum, allow_bins);

        let recombined: Vec<f64> = left.iter().zip(&right).map(|(l, r)| l + r).collect();
        similar_asserts::assert_eq!(whole, recombined, "allow_bins={allow_bins}");
    }

    // And the binned path agrees with the scan path.
    similar_asserts::assert_eq!(
        heatmap_cells(&engine, a, c, HeatmapMode::Sum, true),
        heatmap_cells(&engine, a, c, HeatmapMode::Sum, false),
    );
}

#[test]
fn diff_is_last_minus_first_cell_wise() {
    let engine = linear_engine(60, 4, 16);

    let last = heatmap_cells(&engine, 10, 49, HeatmapMode::Last, true);
    let first = heatmap_cells(&engine, 10, 49, HeatmapMode::First, true);
    let diff = heatmap_cells(&engine, 10, 49, HeatmapMode::Diff, true);

    let nan_to_zero = |v: f64| if v.is_nan() { 0.0 } else { v };
    for cell in 0..diff.len() {
        similar_asserts::assert_eq!(
            diff[cell],
            nan_to_zero(last[cell]) - nan_to_zero(first[cell]),
            "cell {cell}"
        );
    }
}

#[test]
fn unit_systems_are_interchangeable() {
    let engine = linear_engine(40, 2, 8);

    // Events 10..=19 are cycles 105..=195 and instructions 41..=77.
    let by_events = heatmap_cells(&engine, 10, 19, HeatmapMode::Sum, true);
    let by_cycles = engine
        .get_heatmap(
            105,
            195,
            UnitKind::Cycles,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            None,
        )
        .unwrap();
    let by_instructions = engine
        .get_heatmap(
            41,
            77,
            UnitKind::Instructions,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            None,
        )
        .unwrap();

    similar_asserts::assert_eq!(by_events, by_cycles.cells.to_vec());
    similar_asserts::assert_eq!(by_events, by_instructions.cells.to_vec());
}

#[test]
fn filtered_sums_scan_only_matching_branches() {
    let engine = linear_engine(32, 2, 8);

    // Keep only pc 0x400000: events 0, 4, 8, …
    let filter = FilterSpec {
        addresses: vec![AddressPredicate {
            address: AddressMatcher::Address { addr: 0x0040_0000 },
            include: true,
            enabled: true,
        }],
        ..Default::default()
    };

    let filtered = engine
        .get_heatmap(
            0,
            31,
            UnitKind::Events,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            Some(&filter),
        )
        .unwrap();

    // Reference: sum the surviving events one by one.
    let mut expected = vec![0.0; engine.dataset().geometry().num_cells()];
    for event in (0..32).step_by(4) {
        let one = heatmap_cells(&engine, event, event, HeatmapMode::Sum, false);
        for (acc, v) in expected.iter_mut().zip(&one) {
            *acc += v;
        }
    }
    similar_asserts::assert_eq!(filtered.cells.to_vec(), expected);
}

#[test]
fn filters_are_rejected_for_coalescing_modes() {
    let engine = small_engine();
    let filter = FilterSpec {
        addresses: vec![AddressPredicate {
            address: AddressMatcher::Address { addr: 0x0040_0100 },
            include: true,
            enabled: true,
        }],
        ..Default::default()
    };

    for mode in [HeatmapMode::Diff, HeatmapMode::First, HeatmapMode::Last] {
        let result = engine.get_heatmap(
            0,
            2,
            UnitKind::Events,
            "weight",
            ValueTransform::Identity,
            mode,
            true,
            Some(&filter),
        );
        assert!(matches!(result, Err(QueryError::MalformedFilter(_))), "{mode}");
    }

    // An empty filter spec is the pass-all fast path, not an error.
    let result = engine.get_heatmap(
        0,
        2,
        UnitKind::Events,
        "weight",
        ValueTransform::Identity,
        HeatmapMode::Last,
        true,
        Some(&FilterSpec::default()),
    );
    assert!(result.is_ok());
}

#[test]
fn error_taxonomy_round_trips() {
    let engine = small_engine();

    assert!(matches!(
        engine.get_heatmap(
            100,
            200,
            UnitKind::Cycles,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            None,
        ),
        Err(QueryError::OutOfRange(_))
    ));

    assert!(matches!(
        engine.get_heatmap(
            0,
            2,
            UnitKind::Events,
            "no_such_stat",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            None,
        ),
        Err(QueryError::UnknownStat(_))
    ));

    assert!(matches!(
        engine.get_line_points(0, 2, UnitKind::Events, &["no_such_stat".to_owned()], 0, None),
        Err(QueryError::UnknownStat(_))
    ));
}

#[test]
fn repeated_heatmap_queries_share_one_buffer() {
    let engine = linear_engine(32, 2, 8);

    let run = || {
        engine
            .get_heatmap(
                0,
                31,
                UnitKind::Events,
                "weight",
                ValueTransform::Identity,
                HeatmapMode::Sum,
                true,
                None,
            )
            .unwrap()
    };
    let a = run();
    let b = run();
    assert!(Arc::ptr_eq(&a.cells, &b.cells));
}

#[test]
fn line_points_over_the_engine_surface() {
    let engine = linear_engine(200, 1, 8);

    let plot = engine
        .get_line_points(
            0,
            100_000,
            UnitKind::Cycles,
            &["taken".to_owned(), "mispredicted".to_owned()],
            50,
            None,
        )
        .unwrap();

    // 200 events into ≤ 50 points needs factor 4; output is labeled lossy.
    assert_eq!(plot.downsample_factor, 4);
    assert_eq!(plot.rows.len(), 3);
    assert_eq!(plot.num_points(), 50);
    // Every full bucket of `taken` (alternating 0/1) averages to 0.5.
    assert!(plot.rows[1].iter().all(|v| *v == 0.5));
}

#[test]
fn engine_stats_report_progress() {
    let engine = small_engine();
    let stats = engine.stats();
    assert_eq!(stats.num_events, 3);
    assert_eq!(stats.num_updates, 9);
    assert_eq!(stats.num_cells, 6);
    assert_eq!(stats.built_generators, 0);

    heatmap_cells(&engine, 0, 2, HeatmapMode::Sum, true);
    let stats = engine.stats();
    assert_eq!(stats.built_generators, 1);
    assert_eq!(stats.caches.heatmaps, 1);

    engine.purge_caches();
    assert_eq!(engine.stats().caches.heatmaps, 0);
}

#[test]
fn structurally_identical_filters_share_cached_masks() {
    let engine = linear_engine(32, 2, 8);

    let spec = || FilterSpec {
        addresses: vec![AddressPredicate {
            address: AddressMatcher::MaskedAddress {
                addr: 0x0040_0000,
                mask: 0xffff_0000,
            },
            include: true,
            enabled: true,
        }],
        ..Default::default()
    };

    let a = spec();
    let b = spec();
    assert_eq!(a, b);

    engine
        .get_heatmap(
            0,
            31,
            UnitKind::Events,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            Some(&a),
        )
        .unwrap();
    let masks = engine.stats().caches.masks;
    assert_eq!(masks, 1);

    // An independently constructed but identical spec reuses the mask.
    engine
        .get_heatmap(
            0,
            31,
            UnitKind::Events,
            "weight",
            ValueTransform::Identity,
            HeatmapMode::Sum,
            true,
            Some(&b),
        )
        .unwrap();
    assert_eq!(engine.stats().caches.masks, masks);
}

#[test]
fn caches_expire_on_idle_time_not_access_order() {
    // Tiny expiry so the test can outwait two full intervals.
    let config = EngineConfig {
        bin_size: 2,
        cache_expiry: Duration::from_millis(20),
        ..Default::default()
    };
    let engine = Engine::new(Arc::new(testing::small_dataset()), config);

    heatmap_cells(&engine, 0, 2, HeatmapMode::Sum, true);
    assert_eq!(engine.stats().caches.heatmaps, 1);

    // Two untouched expiry intervals: marked expiring, then dropped. The
    // third query both sweeps and repopulates.
    std::thread::sleep(Duration::from_millis(25));
    heatmap_cells(&engine, 0, 1, HeatmapMode::Sum, true);
    std::thread::sleep(Duration::from_millis(25));
    heatmap_cells(&engine, 1, 2, HeatmapMode::Sum, true);
    std::thread::sleep(Duration::from_millis(25));
    heatmap_cells(&engine, 0, 0, HeatmapMode::Sum, true);

    let cached = engine.stats().caches.heatmaps;
    assert!(
        cached < 4,
        "idle entries should have been swept, found {cached}"
    );
}
