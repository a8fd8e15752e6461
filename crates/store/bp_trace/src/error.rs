use crate::UnitKind;

/// The requested range does not intersect the loaded trace.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error(
    "requested {unit} range [{first}, {last}] does not intersect the loaded trace ({num_rows} rows)"
)]
pub struct OutOfRangeError {
    pub first: u64,
    pub last: u64,
    pub unit: UnitKind,
    pub num_rows: usize,
}

/// A requested stat name is not present in the loaded schema.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("unknown stat {0:?}")]
pub struct UnknownStatError(pub String);

/// An internal consistency check failed.
///
/// This indicates a loader/engine mismatch, not a user error, and is not
/// recoverable by retrying the query.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("shape invariant violated: {0}")]
pub struct ShapeInvariantError(pub String);
