//! Binned vs. scanned range-sum heatmaps.

use criterion::{Criterion, criterion_group, criterion_main};

use bp_query::{BinSet, ValueTransform, bins::sum_scan};
use bp_trace::{RowSpan, testing};

const NUM_EVENTS: usize = 100_000;
const UPDATES_PER_EVENT: usize = 4;
const BIN_SIZE: usize = 4096;

fn range_sum(c: &mut Criterion) {
    let dataset = testing::linear_dataset(NUM_EVENTS, UPDATES_PER_EVENT);
    let secondary = dataset.secondary();
    let geometry = dataset.geometry();
    let weights = secondary.value_column(secondary.schema().index_of("weight").unwrap());

    let bins = BinSet::build(
        secondary,
        geometry,
        weights,
        ValueTransform::Identity,
        BIN_SIZE,
    )
    .unwrap();

    let num_updates = NUM_EVENTS * UPDATES_PER_EVENT;
    let span = RowSpan::new(num_updates / 10, num_updates - num_updates / 10);

    let mut group = c.benchmark_group("range_sum");
    group.bench_function("binned", |b| {
        b.iter(|| {
            bins.range_sum(
                secondary,
                geometry,
                weights,
                ValueTransform::Identity,
                span,
            )
        });
    });
    group.bench_function("scan", |b| {
        b.iter(|| {
            sum_scan(
                secondary,
                geometry,
                weights,
                ValueTransform::Identity,
                span,
                None,
            )
        });
    });
    group.finish();
}

criterion_group!(benches, range_sum);
criterion_main!(benches);
