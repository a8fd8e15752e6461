//! Deterministic synthetic traces for tests and benchmarks.
//!
//! No RNG anywhere: the same call always builds the same table, so failures
//! reproduce byte-for-byte.

use crate::{BranchClass, PrimaryTable, SecondaryTable, TraceDataset};

/// The tiny hand-written trace used by the coalescing tests: 9 weight updates
/// over a `2×1×3` (table×bank×row) geometry, three updates per event.
///
/// The final update of each cell (by update index) is, per flat cell:
/// `[2, 5, 6, 3, 7, unset]` over updates `[0, 7]`, and `[2, 8, 6, 3, 7, unset]`
/// once update 8 is included.
pub fn small_dataset() -> TraceDataset {
    let primary = PrimaryTable::new(
        vec![10, 20, 30],
        vec![100, 200, 300],
        vec![0x0040_0100, 0x0040_0200, 0x0040_0100],
        vec![0x0040_0110, 0x0040_0210, 0x0040_0110],
        vec![
            BranchClass {
                is_conditional: true,
                is_direct: true,
            };
            3
        ],
        vec![0, 3, 6],
        vec![
            ("taken".to_owned(), vec![1.0, 0.0, 1.0]),
            ("mispredicted".to_owned(), vec![0.0, 1.0, 0.0]),
        ],
    )
    .expect("valid primary fixture");

    #[rustfmt::skip]
    let updates: [(u16, u32, f64); 9] = [
        // (table, row, value); single bank
        (0, 0, 1.0),
        (1, 0, 3.0),
        (0, 1, 9.0),
        (0, 2, 6.0),
        (1, 1, 7.0),
        (0, 1, 5.0),
        (0, 0, 2.0),
        (1, 0, 3.0),
        (0, 1, 8.0),
    ];

    let secondary = SecondaryTable::new(
        updates.iter().map(|(t, _, _)| *t).collect(),
        vec![0; updates.len()],
        updates.iter().map(|(_, r, _)| *r).collect(),
        (0..updates.len()).map(|i| i / 3).collect(),
        vec![(
            "weight".to_owned(),
            updates.iter().map(|(_, _, v)| *v).collect(),
        )],
    )
    .expect("valid secondary fixture");

    TraceDataset::new(primary, secondary).expect("valid fixture dataset")
}

/// A larger trace with `num_events` training events and a fixed number of
/// weight updates per event, over a `4×2×8` geometry.
pub fn linear_dataset(num_events: usize, updates_per_event: usize) -> TraceDataset {
    let pcs: [u64; 4] = [0x0040_0000, 0x0040_0040, 0x0040_1000, 0x007f_ff00];

    let mut taken = Vec::with_capacity(num_events);
    let mut mispredicted = Vec::with_capacity(num_events);
    let mut confidence = Vec::with_capacity(num_events);
    let mut pc = Vec::with_capacity(num_events);
    let mut class = Vec::with_capacity(num_events);
    for i in 0..num_events {
        taken.push((i % 2) as f64);
        mispredicted.push(if i % 5 == 0 { 1.0 } else { 0.0 });
        confidence.push((i % 7) as f64);
        pc.push(pcs[i % pcs.len()]);
        class.push(BranchClass {
            is_conditional: i % pcs.len() != 3,
            is_direct: i % pcs.len() != 2,
        });
    }

    let primary = PrimaryTable::new(
        (0..num_events as u64).map(|i| 10 * i + 5).collect(),
        (0..num_events as u64).map(|i| 4 * i + 1).collect(),
        pc.clone(),
        pc.iter().map(|pc| pc + 0x10).collect(),
        class,
        (0..num_events).map(|i| i * updates_per_event).collect(),
        vec![
            ("taken".to_owned(), taken),
            ("mispredicted".to_owned(), mispredicted),
            ("confidence".to_owned(), confidence),
        ],
    )
    .expect("valid synthetic primary");

    let num_updates = num_events * updates_per_event;
    let mut table = Vec::with_capacity(num_updates);
    let mut bank = Vec::with_capacity(num_updates);
    let mut row = Vec::with_capacity(num_updates);
    let mut owner = Vec::with_capacity(num_updates);
    let mut weight = Vec::with_capacity(num_updates);
    for i in 0..num_events {
        for j in 0..updates_per_event {
            table.push(((i + j) % 4) as u16);
            bank.push((j % 2) as u16);
            row.push(((i * 3 + j) % 8) as u32);
            owner.push(i);
            weight.push(((i * 7 + j * 13) % 23) as f64 - 11.0);
        }
    }

    let secondary = SecondaryTable::new(
        table,
        bank,
        row,
        owner,
        vec![("weight".to_owned(), weight)],
    )
    .expect("valid synthetic secondary");

    TraceDataset::new(primary, secondary).expect("valid synthetic dataset")
}
