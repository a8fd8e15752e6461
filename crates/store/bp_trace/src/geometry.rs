/// The predictor's weight storage geometry: `table × bank × row` extents.
///
/// Computed once at load time from the secondary table; every heatmap query
/// addresses cells through the flat index defined here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Geometry {
    pub num_tables: u16,
    pub num_banks: u16,
    pub num_rows: u32,
}

impl Geometry {
    /// Smallest geometry covering the given per-update coordinates.
    pub fn from_coords(tables: &[u16], banks: &[u16], rows: &[u32]) -> Self {
        let max_of_u16 = |xs: &[u16]| xs.iter().copied().max().unwrap_or(0);
        Self {
            num_tables: max_of_u16(tables) + 1,
            num_banks: max_of_u16(banks) + 1,
            num_rows: rows.iter().copied().max().unwrap_or(0) + 1,
        }
    }

    /// Total number of heatmap cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_tables as usize * self.num_banks as usize * self.num_rows as usize
    }

    /// Flat cell index of a `(table, bank, row)` coordinate.
    ///
    /// The flat layout is column-major for a `[row][table*bank]` matrix:
    /// each `(table, bank)` column is one contiguous run of `num_rows` cells.
    #[inline]
    pub fn cell_index(&self, table: u16, bank: u16, row: u32) -> usize {
        debug_assert!(table < self.num_tables && bank < self.num_banks && row < self.num_rows);
        (table as usize * self.num_banks as usize + bank as usize) * self.num_rows as usize
            + row as usize
    }

    /// Inverse of [`Self::cell_index`].
    #[inline]
    pub fn cell_coords(&self, cell: usize) -> (u16, u16, u32) {
        let row = (cell % self.num_rows as usize) as u32;
        let column = cell / self.num_rows as usize;
        let bank = (column % self.num_banks as usize) as u16;
        let table = (column / self.num_banks as usize) as u16;
        (table, bank, row)
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}×{}×{} (table×bank×row)",
            self.num_tables, self.num_banks, self.num_rows
        )
    }
}
