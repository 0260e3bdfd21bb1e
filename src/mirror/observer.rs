//! Collaborators that react to changes in a mirrored working copy.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::git::FileDiff;

/// Hooks invoked synchronously by a [`Mirror`](super::Mirror).
///
/// Implementations must not block: the mirror's update cycle waits for every
/// observer before it completes.
pub trait Observer: Send {
    /// The complete tracked-file list, delivered once at registration when the
    /// working copy is not empty.
    fn on_full_list(&mut self, repository: &Path, files: &[String]);

    /// The change set of one completed update cycle.  Never empty.
    fn on_diff(&mut self, repository: &Path, diff: &FileDiff);
}

/// Stable identifier of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

/// Owns registered observers and iterates them in registration order.
#[derive(Default)]
pub struct ObserverRegistry {
    slots: BTreeMap<ObserverId, Box<dyn Observer>>,
    next_id: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, observer: Box<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, observer);
        id
    }

    pub fn remove(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        self.slots.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Observer>> + '_ {
        self.slots.values_mut()
    }
}

/// Observer that reports every notification to the log.
#[derive(Debug, Clone)]
pub struct LogObserver {
    name: String,
}

impl LogObserver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Observer for LogObserver {
    fn on_full_list(&mut self, repository: &Path, files: &[String]) {
        info!(
            repo = %self.name,
            path = %repository.display(),
            files = files.len(),
            "tracked files available"
        );
        debug!(repo = %self.name, ?files, "tracked file list");
    }

    fn on_diff(&mut self, repository: &Path, diff: &FileDiff) {
        info!(
            repo = %self.name,
            path = %repository.display(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "repository changed"
        );
        debug!(repo = %self.name, added = ?diff.added, removed = ?diff.removed, "file diff");
    }
}
