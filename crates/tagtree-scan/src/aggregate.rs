use std::collections::BTreeSet;
use std::path::Path;

use tagtree_core::{Match, ScanUnit};

/// Every known marker across all scanned files.
///
/// Entries are kept in insertion order; [`ResultAggregate::sorted_view`]
/// produces the presentation order.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregate {
    entries: Vec<Match>,
}

impl ResultAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append matches as-is.
    pub fn merge(&mut self, matches: impl IntoIterator<Item = Match>) {
        self.entries.extend(matches);
    }

    /// Drop every entry for `file`. Returns how many were removed.
    pub fn remove_file(&mut self, file: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.file != file);
        before - self.entries.len()
    }

    /// Replace everything `unit` covers with its fresh results.
    ///
    /// For a file unit this is "remove the file, then merge"; for a folder unit
    /// every entry under the folder is dropped first.
    pub fn replace_scope(&mut self, unit: &ScanUnit, matches: Vec<Match>) {
        self.entries.retain(|m| !unit.covers(&m.file));
        self.merge(matches);
    }

    /// Entries ordered by `(file, line)`; equal keys keep insertion order.
    pub fn sorted_view(&self) -> Vec<Match> {
        let mut view = self.entries.clone();
        view.sort_by(Match::display_cmp);
        view
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn files(&self) -> BTreeSet<&Path> {
        self.entries.iter().map(|m| m.file.as_path()).collect()
    }
}
