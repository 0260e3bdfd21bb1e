//! File-level change sets between two tree snapshots.

use std::collections::BTreeSet;

use git2::Oid;

/// One changed tree entry as reported by a tree-to-tree diff.
///
/// A zero id means the entry is absent on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub old_id: Oid,
    pub new_id: Oid,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
}

impl Change {
    pub(crate) fn from_delta(delta: &git2::DiffDelta<'_>) -> Self {
        let path = |file: git2::DiffFile<'_>| {
            file.path()
                .map(|p| p.to_string_lossy().into_owned())
        };
        Self {
            old_id: delta.old_file().id(),
            new_id: delta.new_file().id(),
            old_path: path(delta.old_file()),
            new_path: path(delta.new_file()),
        }
    }
}

/// Paths added and removed by one update cycle.
///
/// Content replaced in place shows up in both sets; there is no separate
/// "modified" kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Classify `change` as an addition, a removal, or a replacement.
    pub fn record(&mut self, change: Change) {
        if change.old_id.is_zero() {
            self.added.extend(change.new_path);
        } else if change.new_id.is_zero() {
            self.removed.extend(change.old_path);
        } else {
            self.removed.extend(change.old_path);
            self.added.extend(change.new_path);
        }
    }
}

impl FromIterator<Change> for FileDiff {
    fn from_iter<I: IntoIterator<Item = Change>>(iter: I) -> Self {
        let mut diff = Self::default();
        for change in iter {
            diff.record(change);
        }
        diff
    }
}
