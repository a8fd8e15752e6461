use crate::{ColumnSchema, OutOfRangeError, RowSpan, ShapeInvariantError};

/// The unit system a query range is expressed in.
///
/// Each unit corresponds to a monotonically non-decreasing column of the
/// primary table, so the three systems are freely interchangeable at query
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Simulated cycle count.
    Cycles,

    /// Retired instruction count.
    Instructions,

    /// Raw primary-event index.
    Events,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycles => "cycles".fmt(f),
            Self::Instructions => "instructions".fmt(f),
            Self::Events => "events".fmt(f),
        }
    }
}

/// Static classification of one branch instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BranchClass {
    pub is_conditional: bool,
    pub is_direct: bool,
}

/// One row per branch training event, column-major.
#[derive(Clone, Debug)]
pub struct PrimaryTable {
    /// Cycle count at each event; non-decreasing.
    cycles: Vec<u64>,

    /// Retired instruction count at each event; non-decreasing.
    instructions: Vec<u64>,

    /// Branch program counter.
    pc: Vec<u64>,

    /// Branch target address.
    target: Vec<u64>,

    class: Vec<BranchClass>,

    /// Index of this event's first row in the secondary table.
    ///
    /// Event `i` owns secondary rows `[first_secondary[i], first_secondary[i+1])`
    /// (through the end of the secondary table for the last event).
    first_secondary: Vec<usize>,

    /// Per-event stat columns (taken, mispredicted, confidence, …).
    stats: Vec<Vec<f64>>,
    schema: ColumnSchema,
}

impl PrimaryTable {
    pub fn new(
        cycles: Vec<u64>,
        instructions: Vec<u64>,
        pc: Vec<u64>,
        target: Vec<u64>,
        class: Vec<BranchClass>,
        first_secondary: Vec<usize>,
        stats: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, ShapeInvariantError> {
        let num_rows = cycles.len();
        for (what, len) in [
            ("instructions", instructions.len()),
            ("pc", pc.len()),
            ("target", target.len()),
            ("class", class.len()),
            ("first_secondary", first_secondary.len()),
        ] {
            if len != num_rows {
                return Err(ShapeInvariantError(format!(
                    "primary column {what:?} has {len} rows, expected {num_rows}"
                )));
            }
        }

        let (names, columns): (Vec<_>, Vec<_>) = stats.into_iter().unzip();
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != num_rows {
                return Err(ShapeInvariantError(format!(
                    "primary stat column {name:?} has {} rows, expected {num_rows}",
                    column.len()
                )));
            }
        }

        for (what, column) in [("cycles", &cycles), ("instructions", &instructions)] {
            if !column.is_sorted() {
                return Err(ShapeInvariantError(format!(
                    "primary unit column {what:?} is not non-decreasing"
                )));
            }
        }
        if !first_secondary.is_sorted() {
            return Err(ShapeInvariantError(
                "first_secondary indices are not non-decreasing".to_owned(),
            ));
        }

        Ok(Self {
            cycles,
            instructions,
            pc,
            target,
            class,
            first_secondary,
            stats: columns,
            schema: ColumnSchema::new(names),
        })
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.cycles.len()
    }

    #[inline]
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    #[inline]
    pub fn stat_column(&self, column: usize) -> &[f64] {
        &self.stats[column]
    }

    #[inline]
    pub fn pc(&self, row: usize) -> u64 {
        self.pc[row]
    }

    #[inline]
    pub fn target(&self, row: usize) -> u64 {
        self.target[row]
    }

    #[inline]
    pub fn class(&self, row: usize) -> BranchClass {
        self.class[row]
    }

    #[inline]
    pub fn first_secondary(&self) -> &[usize] {
        &self.first_secondary
    }

    /// The unit value of the given row in the given unit system.
    #[inline]
    pub fn unit_value(&self, row: usize, unit: UnitKind) -> u64 {
        match unit {
            UnitKind::Cycles => self.cycles[row],
            UnitKind::Instructions => self.instructions[row],
            UnitKind::Events => row as u64,
        }
    }

    /// Maps a `[first, last]` unit range to the inclusive row range it covers.
    ///
    /// Binary-searches the selected monotonic unit column for the first row
    /// with `value >= first` and the last row with `value <= last`, clamped to
    /// the table. Errors if the requested range does not intersect the data.
    pub fn rows_in_range(
        &self,
        first: u64,
        last: u64,
        unit: UnitKind,
    ) -> Result<RowSpan, OutOfRangeError> {
        let num_rows = self.num_rows();
        let out_of_range = || OutOfRangeError {
            first,
            last,
            unit,
            num_rows,
        };

        if last < first || num_rows == 0 {
            return Err(out_of_range());
        }

        let (first_row, last_row) = match unit {
            UnitKind::Events => {
                let first_row = first as usize;
                if first_row >= num_rows {
                    return Err(out_of_range());
                }
                (first_row, usize::min(last as usize, num_rows - 1))
            }
            UnitKind::Cycles | UnitKind::Instructions => {
                let column: &[u64] = match unit {
                    UnitKind::Cycles => &self.cycles,
                    UnitKind::Instructions => &self.instructions,
                    UnitKind::Events => unreachable!(),
                };

                let first_row = column.partition_point(|v| *v < first);
                // First row whose value exceeds `last`, minus one: the
                // half-open search translated to an inclusive bound.
                let past_last = column.partition_point(|v| *v <= last);
                if first_row >= past_last {
                    return Err(out_of_range());
                }
                (first_row, past_last - 1)
            }
        };

        debug_assert!(first_row <= last_row && last_row < num_rows);
        debug_assert!(self.unit_value(first_row, unit) >= first);
        debug_assert!(self.unit_value(last_row, unit) <= last);

        Ok(RowSpan::new(first_row, last_row))
    }
}

/// One row per weight-table update, column-major.
#[derive(Clone, Debug)]
pub struct SecondaryTable {
    table: Vec<u16>,
    bank: Vec<u16>,
    row: Vec<u32>,

    /// Back-pointer to the primary event this update belongs to.
    owner: Vec<usize>,

    /// Per-update value columns (new weight, delta, …).
    values: Vec<Vec<f64>>,
    schema: ColumnSchema,
}

impl SecondaryTable {
    pub fn new(
        table: Vec<u16>,
        bank: Vec<u16>,
        row: Vec<u32>,
        owner: Vec<usize>,
        values: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, ShapeInvariantError> {
        let num_rows = table.len();
        for (what, len) in [("bank", bank.len()), ("row", row.len()), ("owner", owner.len())] {
            if len != num_rows {
                return Err(ShapeInvariantError(format!(
                    "secondary column {what:?} has {len} rows, expected {num_rows}"
                )));
            }
        }

        let (names, columns): (Vec<_>, Vec<_>) = values.into_iter().unzip();
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != num_rows {
                return Err(ShapeInvariantError(format!(
                    "secondary value column {name:?} has {} rows, expected {num_rows}",
                    column.len()
                )));
            }
        }

        Ok(Self {
            table,
            bank,
            row,
            owner,
            values: columns,
            schema: ColumnSchema::new(names),
        })
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    #[inline]
    pub fn value_column(&self, column: usize) -> &[f64] {
        &self.values[column]
    }

    #[inline]
    pub fn coords(&self, update: usize) -> (u16, u16, u32) {
        (self.table[update], self.bank[update], self.row[update])
    }

    #[inline]
    pub fn owner(&self, update: usize) -> usize {
        self.owner[update]
    }

    #[inline]
    pub fn tables(&self) -> &[u16] {
        &self.table
    }

    #[inline]
    pub fn banks(&self) -> &[u16] {
        &self.bank
    }

    #[inline]
    pub fn rows(&self) -> &[u32] {
        &self.row
    }
}

#[cfg(test)]
mod tests {
    use super::{BranchClass, PrimaryTable, UnitKind};

    fn primary() -> PrimaryTable {
        // Four events at cycles 10, 20, 20, 40.
        PrimaryTable::new(
            vec![10, 20, 20, 40],
            vec![2, 4, 6, 8],
            vec![0x1000; 4],
            vec![0x2000; 4],
            vec![BranchClass::default(); 4],
            vec![0, 0, 0, 0],
            vec![("taken".to_owned(), vec![1.0, 0.0, 1.0, 1.0])],
        )
        .unwrap()
    }

    #[test]
    fn maps_cycle_ranges_to_rows() {
        let primary = primary();

        let span = primary.rows_in_range(10, 40, UnitKind::Cycles).unwrap();
        assert_eq!((span.first, span.last), (0, 3));

        // Duplicate unit values are all included.
        let span = primary.rows_in_range(20, 20, UnitKind::Cycles).unwrap();
        assert_eq!((span.first, span.last), (1, 2));

        // A range that starts between events snaps forward.
        let span = primary.rows_in_range(11, 39, UnitKind::Cycles).unwrap();
        assert_eq!((span.first, span.last), (1, 2));
    }

    #[test]
    fn maps_event_index_ranges() {
        let primary = primary();

        let span = primary.rows_in_range(1, 100, UnitKind::Events).unwrap();
        assert_eq!((span.first, span.last), (1, 3));

        assert!(primary.rows_in_range(4, 100, UnitKind::Events).is_err());
    }

    #[test]
    fn rejects_disjoint_ranges() {
        let primary = primary();

        // Entirely before the first event.
        assert!(primary.rows_in_range(0, 9, UnitKind::Cycles).is_err());
        // Entirely after the last event.
        assert!(primary.rows_in_range(41, 100, UnitKind::Cycles).is_err());
        // Inverted.
        assert!(primary.rows_in_range(30, 20, UnitKind::Cycles).is_err());
        // Between two events, covering none.
        assert!(primary.rows_in_range(21, 39, UnitKind::Cycles).is_err());
    }

    #[test]
    fn rejects_malformed_columns() {
        assert!(
            PrimaryTable::new(
                vec![10, 5], // not monotonic
                vec![1, 2],
                vec![0; 2],
                vec![0; 2],
                vec![BranchClass::default(); 2],
                vec![0, 0],
                vec![],
            )
            .is_err()
        );

        assert!(
            PrimaryTable::new(
                vec![10, 20],
                vec![1, 2],
                vec![0; 2],
                vec![0; 2],
                vec![BranchClass::default(); 2],
                vec![0, 0],
                vec![("taken".to_owned(), vec![1.0])], // wrong length
            )
            .is_err()
        );
    }
}
