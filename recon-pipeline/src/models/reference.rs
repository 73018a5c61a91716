//! Reference sets used for deduplication

use recon_common::Identifier;
use std::collections::HashSet;

/// Raw trimmed values to exclude (root list); fixed for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    values: HashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.values.iter()
    }
}

impl FromIterator<String> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// In-memory mirror of the identifiers stored in the history collection
///
/// The store stays the source of truth; the mirror is appended to as
/// identifiers are committed and pruned as batches are deleted.
#[derive(Debug, Clone, Default)]
pub struct HistorySet {
    ids: HashSet<Identifier>,
}

impl HistorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: Identifier) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &Identifier) -> bool {
        self.ids.remove(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Identifiers in ascending order
    pub fn sorted(&self) -> Vec<Identifier> {
        let mut ids: Vec<_> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

impl Extend<Identifier> for HistorySet {
    fn extend<I: IntoIterator<Item = Identifier>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl FromIterator<Identifier> for HistorySet {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
