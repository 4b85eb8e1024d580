/// The set of folders a walk gave up on.
///
/// Kept sorted so summaries and diagnostics list folders in a stable order.
use serde::Serialize;
use std::collections::BTreeSet;

/// Folders left out of a walk because they stalled.
///
/// Matching is by whole path components: `a/b` covers `a/b` and `a/b/x`,
/// never `a/bc/x`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkippedFolderSet {
    folders: BTreeSet<String>,
}

impl SkippedFolderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the folder was already present.
    pub fn insert(&mut self, folder: impl Into<String>) -> bool {
        let folder = folder.into();
        let folder = folder.trim_end_matches('/');
        self.folders.insert(folder.to_owned())
    }

    /// `true` if `path` is a skipped folder or lies beneath one.
    pub fn covers(&self, path: &str) -> bool {
        if self.folders.is_empty() {
            return false;
        }
        if self.folders.contains(path) {
            return true;
        }
        path.match_indices('/')
            .any(|(i, _)| self.folders.contains(&path[..i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching_respects_components() {
        let mut set = SkippedFolderSet::new();
        assert!(set.insert("a/b"));
        assert!(!set.insert("a/b/"));
        assert!(set.covers("a/b"));
        assert!(set.covers("a/b/x.txt"));
        assert!(set.covers("a/b/deep/y.txt"));
        assert!(!set.covers("a/bc/x.txt"));
        assert!(!set.covers("a/x.txt"));
        assert!(!set.covers("a"));
    }

    #[test]
    fn empty_set_covers_nothing() {
        let set = SkippedFolderSet::new();
        assert!(!set.covers("anything/at/all"));
        assert!(set.is_empty());
    }
}
