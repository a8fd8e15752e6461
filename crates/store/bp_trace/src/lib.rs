//! In-memory columnar tables for branch-predictor simulation traces.
//!
//! A loaded trace consists of two append-only, column-major tables:
//!
//! * the *primary* table, one row per branch training event, and
//! * the *secondary* table, one row per weight-table update.
//!
//! Secondary rows belonging to the same primary event are contiguous, so the
//! primary table only stores the index of each event's first update
//! ([`PrimaryTable::first_secondary`]).
//!
//! Everything in here is immutable once loaded; all query-time state lives in
//! `bp_query`.

mod dataset;
mod error;
mod geometry;
mod schema;
mod span;
mod table;

#[cfg(feature = "testing")]
pub mod testing;

pub use self::dataset::TraceDataset;
pub use self::error::{OutOfRangeError, ShapeInvariantError, UnknownStatError};
pub use self::geometry::Geometry;
pub use self::schema::{ColumnSchema, ResolvedStat};
pub use self::span::RowSpan;
pub use self::table::{BranchClass, PrimaryTable, SecondaryTable, UnitKind};
