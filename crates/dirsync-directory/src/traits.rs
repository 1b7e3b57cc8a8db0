//! Directory capability traits
//!
//! The reconciliation core only ever sees a directory through these traits.
//! All calls block until the directory answers.

use crate::error::DirectoryResult;
use crate::operation::{ChangeRecord, DirectoryEntry, Filter, NewEntry};

/// Capability for searching a directory subtree.
pub trait DirectorySearch {
    /// Search the subtree rooted at `base` for entries matching `filter`.
    ///
    /// # Arguments
    /// * `base` - Search base DN
    /// * `filter` - The search filter to apply
    /// * `attributes` - Attributes to retrieve; empty means all user attributes
    ///
    /// # Errors
    /// Returns `SearchFailed` when the directory reports a non-success result.
    fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<SearchResults>;
}

/// Capability for writing to a directory.
pub trait DirectoryMutate {
    /// Create a new entry.
    fn add(&mut self, entry: &NewEntry) -> DirectoryResult<()>;

    /// Apply every operation of `change` in a single modify request.
    fn modify(&mut self, change: &ChangeRecord) -> DirectoryResult<()>;
}

/// A directory the engine can read from and write to.
pub trait Directory: DirectorySearch + DirectoryMutate {
    /// Display name used in logs and the audit manifest.
    fn name(&self) -> &str;
}

/// The entries returned by one search.
///
/// Finite and one-shot: iterating consumes it, and a fresh search must be
/// issued to enumerate again.
#[derive(Debug)]
pub struct SearchResults {
    entries: std::vec::IntoIter<DirectoryEntry>,
}

impl SearchResults {
    /// Wrap the entries of a completed search.
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for SearchResults {
    type Item = DirectoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for SearchResults {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_results_are_one_shot() {
        let mut results = SearchResults::new(vec![
            DirectoryEntry::new("uid=a,dc=ex"),
            DirectoryEntry::new("uid=b,dc=ex"),
        ]);

        assert_eq!(results.len(), 2);
        assert_eq!(results.next().map(|e| e.dn), Some("uid=a,dc=ex".to_string()));
        assert_eq!(results.len(), 1);
        assert_eq!(results.by_ref().count(), 1);
        assert!(results.next().is_none());
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(SearchResults::empty().count(), 0);
    }
}
