use crate::{Geometry, PrimaryTable, RowSpan, SecondaryTable, ShapeInvariantError};

/// A fully loaded trace: both event tables plus the derived storage geometry.
///
/// Construction validates every cross-table invariant once, so queries can
/// index freely without bounds anxiety.
#[derive(Clone, Debug)]
pub struct TraceDataset {
    primary: PrimaryTable,
    secondary: SecondaryTable,
    geometry: Geometry,
}

impl TraceDataset {
    pub fn new(
        primary: PrimaryTable,
        secondary: SecondaryTable,
    ) -> Result<Self, ShapeInvariantError> {
        let num_secondary = secondary.num_rows();

        for (event, &first) in primary.first_secondary().iter().enumerate() {
            if first > num_secondary {
                return Err(ShapeInvariantError(format!(
                    "event {event} points at secondary row {first}, but the secondary table has \
                     {num_secondary} rows"
                )));
            }
        }

        // Ownership must be the exact inverse of the first_secondary ranges.
        for update in 0..num_secondary {
            let owner = secondary.owner(update);
            if owner >= primary.num_rows() {
                return Err(ShapeInvariantError(format!(
                    "update {update} is owned by event {owner}, but the primary table has {} rows",
                    primary.num_rows()
                )));
            }
            let expected = Self::secondary_range_raw(&primary, num_secondary, owner);
            if !(expected.start <= update && update < expected.end) {
                return Err(ShapeInvariantError(format!(
                    "update {update} claims owner {owner}, whose secondary range is {expected:?}"
                )));
            }
        }

        let geometry =
            Geometry::from_coords(secondary.tables(), secondary.banks(), secondary.rows());
        log::debug!(
            "loaded trace: {} events, {} updates, geometry {geometry}",
            primary.num_rows(),
            secondary.num_rows(),
        );

        Ok(Self {
            primary,
            secondary,
            geometry,
        })
    }

    #[inline]
    pub fn primary(&self) -> &PrimaryTable {
        &self.primary
    }

    #[inline]
    pub fn secondary(&self) -> &SecondaryTable {
        &self.secondary
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn secondary_range_raw(
        primary: &PrimaryTable,
        num_secondary: usize,
        event: usize,
    ) -> std::ops::Range<usize> {
        let first_secondary = primary.first_secondary();
        let start = first_secondary[event];
        let end = first_secondary
            .get(event + 1)
            .copied()
            .unwrap_or(num_secondary);
        start..end
    }

    /// The half-open secondary row range owned by one primary event.
    #[inline]
    pub fn secondary_range(&self, event: usize) -> std::ops::Range<usize> {
        Self::secondary_range_raw(&self.primary, self.secondary.num_rows(), event)
    }

    /// The inclusive secondary span covered by an inclusive primary span,
    /// or `None` if no update falls inside it.
    pub fn secondary_span(&self, primary_span: RowSpan) -> Option<RowSpan> {
        let start = self.secondary_range(primary_span.first).start;
        let end = self.secondary_range(primary_span.last).end;
        (start < end).then(|| RowSpan::new(start, end - 1))
    }

    /// The secondary row index just past the last update at or before the end
    /// of `primary_span` (i.e. the exclusive upper bound of its state).
    #[inline]
    pub fn secondary_end(&self, primary_span: RowSpan) -> usize {
        self.secondary_range(primary_span.last).end
    }
}
