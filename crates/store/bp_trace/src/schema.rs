use ahash::HashMap;

use crate::UnknownStatError;

/// A stat name resolved against a [`ColumnSchema`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedStat {
    pub name: String,
    pub column: usize,
}

/// Maps stat names to column indices within one table.
///
/// All by-name column access goes through this map, resolved once per query,
/// never per row.
#[derive(Clone, Debug, Default)]
pub struct ColumnSchema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnSchema {
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    /// Column names, in schema order.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact-name lookup.
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resolves a requested stat name to one or more columns.
    ///
    /// A trailing `*` acts as a wildcard and expands, in schema order, to
    /// every column whose name starts with the given prefix; this is how
    /// per-table stat families (e.g. `weight_t*`) are requested in one go.
    pub fn resolve(&self, requested: &str) -> Result<Vec<ResolvedStat>, UnknownStatError> {
        if let Some(prefix) = requested.strip_suffix('*') {
            let matches: Vec<ResolvedStat> = self
                .names
                .iter()
                .enumerate()
                .filter(|(_, name)| name.starts_with(prefix))
                .map(|(column, name)| ResolvedStat {
                    name: name.clone(),
                    column,
                })
                .collect();
            if matches.is_empty() {
                return Err(UnknownStatError(requested.to_owned()));
            }
            Ok(matches)
        } else {
            let column = self
                .index_of(requested)
                .ok_or_else(|| UnknownStatError(requested.to_owned()))?;
            Ok(vec![ResolvedStat {
                name: requested.to_owned(),
                column,
            }])
        }
    }
}
