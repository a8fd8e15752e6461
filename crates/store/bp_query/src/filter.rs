//! Compiled branch predicates.
//!
//! A [`FilterSpec`] is the immutable, structurally-comparable description the
//! presentation layer hands us (the nested key/value structure of the query
//! surface, hence the serde derives). Compiling it yields a [`BranchFilter`]
//! that evaluates per primary row against the loaded tables.
//!
//! Filters are value types: two independently constructed specs with the same
//! fields compare equal and hash equal, so structurally identical filters
//! share one cached mask.

use std::hash::{BuildHasher as _, Hash, Hasher};

use itertools::{Either, Itertools as _};
use smallvec::SmallVec;

use bp_trace::{RowSpan, TraceDataset};

/// A filter specification referenced an unsupported address type or omitted a
/// required sub-field.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("malformed filter: {0}")]
pub struct MalformedFilterError(pub String);

// ---

/// Matches a branch PC or target address, exactly or under a mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AddressMatcher {
    Address { addr: u64 },
    MaskedAddress { addr: u64, mask: u64 },
}

impl AddressMatcher {
    #[inline]
    fn matches(&self, address: u64) -> bool {
        match *self {
            Self::Address { addr } => address == addr,
            Self::MaskedAddress { addr, mask } => (address & mask) == (addr & mask),
        }
    }
}

/// One allow/deny entry of the address (or target) list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AddressPredicate {
    pub address: AddressMatcher,

    /// `true` = allow-list entry, `false` = deny-list entry.
    pub include: bool,

    /// Disabled entries are kept in the spec (the UI toggles them) but do not
    /// participate in matching.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conditionality {
    Conditional,
    Unconditional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directness {
    Direct,
    Indirect,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClassPredicates {
    #[serde(default)]
    pub conditionality: Option<Conditionality>,
    #[serde(default)]
    pub directness: Option<Directness>,
}

/// Restricts matching to branches that touched the given storage coordinates.
///
/// A primary row matches if *any* of its secondary updates satisfies all the
/// coordinate sets that are present, simultaneously.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GeometryPredicates {
    #[serde(default, deserialize_with = "scalar_or_list")]
    pub table: Option<Vec<u16>>,
    #[serde(default, deserialize_with = "scalar_or_list")]
    pub bank: Option<Vec<u16>>,
    #[serde(default, deserialize_with = "scalar_or_list")]
    pub row: Option<Vec<u32>>,
}

/// Accepts either a scalar or a list, because the UI sends both shapes.
fn scalar_or_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    use serde::Deserialize as _;

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum ScalarOrList<T> {
        Scalar(T),
        List(Vec<T>),
    }

    Ok(
        Option::<ScalarOrList<T>>::deserialize(deserializer)?.map(|v| match v {
            ScalarOrList::Scalar(x) => vec![x],
            ScalarOrList::List(xs) => xs,
        }),
    )
}

/// The full, immutable filter specification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FilterSpec {
    /// Predicates on the branch PC.
    #[serde(default)]
    pub addresses: Vec<AddressPredicate>,

    /// Predicates on the branch target.
    #[serde(default)]
    pub targets: Vec<AddressPredicate>,

    #[serde(default)]
    pub classes: ClassPredicates,

    /// Storage-coordinate predicates.
    #[serde(default, rename = "shp_table")]
    pub geometry: GeometryPredicates,
}

impl FilterSpec {
    /// `true` if no predicate is set at all: every row passes.
    pub fn is_empty(&self) -> bool {
        let Self {
            addresses,
            targets,
            classes,
            geometry,
        } = self;
        addresses.iter().all(|p| !p.enabled)
            && targets.iter().all(|p| !p.enabled)
            && *classes == ClassPredicates::default()
            && *geometry == GeometryPredicates::default()
    }
}

// ---

type CoordSet<T> = SmallVec<[T; 4]>;

/// A [`FilterSpec`] compiled for per-row evaluation.
///
/// Equality and hashing go through the originating spec (the hash is
/// precomputed once), so a compiled filter can serve directly as a cache key.
#[derive(Clone, Debug)]
pub struct BranchFilter {
    spec: FilterSpec,
    spec_hash: u64,

    pc_include: Vec<AddressMatcher>,
    pc_exclude: Vec<AddressMatcher>,
    target_include: Vec<AddressMatcher>,
    target_exclude: Vec<AddressMatcher>,

    conditionality: Option<Conditionality>,
    directness: Option<Directness>,

    tables: Option<CoordSet<u16>>,
    banks: Option<CoordSet<u16>>,
    rows: Option<CoordSet<u32>>,
}

impl PartialEq for BranchFilter {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.spec == other.spec
    }
}

impl Eq for BranchFilter {}

impl Hash for BranchFilter {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.spec_hash);
    }
}

impl BranchFilter {
    pub fn compile(spec: FilterSpec) -> Result<Self, MalformedFilterError> {
        for predicate in spec.addresses.iter().chain(&spec.targets) {
            if let AddressMatcher::MaskedAddress { mask, .. } = predicate.address {
                if mask == 0 {
                    return Err(MalformedFilterError(
                        "masked address predicate with an all-zero mask matches everything"
                            .to_owned(),
                    ));
                }
            }
        }

        let GeometryPredicates { table, bank, row } = &spec.geometry;
        for (what, is_empty) in [
            ("table", table.as_ref().is_some_and(|s| s.is_empty())),
            ("bank", bank.as_ref().is_some_and(|s| s.is_empty())),
            ("row", row.as_ref().is_some_and(|s| s.is_empty())),
        ] {
            if is_empty {
                return Err(MalformedFilterError(format!(
                    "shp_table.{what} is present but empty"
                )));
            }
        }

        let partition = |predicates: &[AddressPredicate]| -> (Vec<_>, Vec<_>) {
            predicates
                .iter()
                .filter(|p| p.enabled)
                .partition_map(|p| {
                    if p.include {
                        Either::Left(p.address)
                    } else {
                        Either::Right(p.address)
                    }
                })
        };
        let (pc_include, pc_exclude) = partition(&spec.addresses);
        let (target_include, target_exclude) = partition(&spec.targets);

        // Fixed seeds: the hash must be identical for structurally identical
        // specs no matter when or where they were constructed.
        let spec_hash = {
            let mut hasher = ahash::RandomState::with_seeds(0, 1, 2, 3).build_hasher();
            spec.hash(&mut hasher);
            hasher.finish()
        };

        Ok(Self {
            spec_hash,
            pc_include,
            pc_exclude,
            target_include,
            target_exclude,
            conditionality: spec.classes.conditionality,
            directness: spec.classes.directness,
            tables: table.as_ref().map(|s| s.iter().copied().collect()),
            banks: bank.as_ref().map(|s| s.iter().copied().collect()),
            rows: row.as_ref().map(|s| s.iter().copied().collect()),
            spec,
        })
    }

    #[inline]
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// `true` if this filter passes every row (the fast no-op path).
    #[inline]
    pub fn is_pass_all(&self) -> bool {
        self.spec.is_empty()
    }

    fn has_geometry_predicates(&self) -> bool {
        self.tables.is_some() || self.banks.is_some() || self.rows.is_some()
    }

    /// Does primary row `row` pass this filter?
    pub fn accept(&self, dataset: &TraceDataset, row: usize) -> bool {
        let primary = dataset.primary();

        let class = primary.class(row);
        if let Some(conditionality) = self.conditionality {
            if (conditionality == Conditionality::Conditional) != class.is_conditional {
                return false;
            }
        }
        if let Some(directness) = self.directness {
            if (directness == Directness::Direct) != class.is_direct {
                return false;
            }
        }

        if !self.pc_exclude.is_empty() || !self.pc_include.is_empty() {
            let pc = primary.pc(row);
            if self.pc_exclude.iter().any(|m| m.matches(pc)) {
                return false;
            }
            if !self.pc_include.is_empty() && !self.pc_include.iter().any(|m| m.matches(pc)) {
                return false;
            }
        }
        if !self.target_exclude.is_empty() || !self.target_include.is_empty() {
            let target = primary.target(row);
            if self.target_exclude.iter().any(|m| m.matches(target)) {
                return false;
            }
            if !self.target_include.is_empty()
                && !self.target_include.iter().any(|m| m.matches(target))
            {
                return false;
            }
        }

        if self.has_geometry_predicates() {
            let secondary = dataset.secondary();
            let matches_geometry = dataset.secondary_range(row).any(|update| {
                let (table, bank, coord_row) = secondary.coords(update);
                self.tables.as_ref().is_none_or(|s| s.contains(&table))
                    && self.banks.as_ref().is_none_or(|s| s.contains(&bank))
                    && self.rows.as_ref().is_none_or(|s| s.contains(&coord_row))
            });
            if !matches_geometry {
                return false;
            }
        }

        true
    }

    /// The first row in `[start, end]` that passes, or `None`.
    pub fn find_next_matching(
        &self,
        dataset: &TraceDataset,
        start: usize,
        end: usize,
    ) -> Option<usize> {
        if self.is_pass_all() {
            return (start <= end).then_some(start);
        }
        (start..=end).find(|&row| self.accept(dataset, row))
    }

    /// One mask entry per row of `span`; `true` = row passes.
    pub fn make_mask(&self, dataset: &TraceDataset, span: RowSpan) -> Vec<bool> {
        if self.is_pass_all() {
            return vec![true; span.len()];
        }
        span.iter().map(|row| self.accept(dataset, row)).collect()
    }
}

// ---
