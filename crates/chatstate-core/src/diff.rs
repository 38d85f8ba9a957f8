use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::dispatcher::Reduce;
use super::event::ServerEvent;

/// One file's change in the active session. Counts come from the host and are never
/// recomputed from `before`/`after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffEntry {
    pub file: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    pub additions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTotals {
    pub files: usize,
    pub additions: u64,
    pub deletions: u64,
}

/// The latest `session.diff` batch, replaced wholesale and never merged.
///
/// The reducer does not look at `sessionID`; callers that only want the active session's
/// diffs put a [`crate::scope::SessionScope`] in front of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileDiffStore {
    entries: Arc<Vec<FileDiffEntry>>,
}

impl FileDiffStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FileDiffEntry] {
        self.entries.as_slice()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry for `file`; batches may repeat a path.
    pub fn find(&self, file: &str) -> Option<&FileDiffEntry> {
        self.entries.iter().find(|entry| entry.file == file)
    }

    pub fn totals(&self) -> DiffTotals {
        self.entries
            .iter()
            .fold(DiffTotals::default(), |totals, entry| DiffTotals {
                files: totals.files + 1,
                additions: totals.additions.saturating_add(entry.additions),
                deletions: totals.deletions.saturating_add(entry.deletions),
            })
    }

    pub fn set_diffs(&mut self, diffs: Vec<FileDiffEntry>) {
        self.entries = Arc::new(diffs);
    }

    pub fn clear_diffs(&mut self) {
        self.entries = Arc::default();
    }
}

impl From<Vec<FileDiffEntry>> for FileDiffStore {
    fn from(entries: Vec<FileDiffEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl Reduce for FileDiffStore {
    fn reduce(&self, event: &ServerEvent) -> Self {
        match event {
            ServerEvent::SessionDiff(session_diff) => Self::from(session_diff.diff.clone()),
            ServerEvent::PermissionUpdated(_)
            | ServerEvent::PermissionReplied(_)
            | ServerEvent::Other(_) => self.clone(),
        }
    }

    fn same_snapshot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl PartialEq for FileDiffStore {
    fn eq(&self, other: &Self) -> bool {
        self.same_snapshot(other) || self.entries == other.entries
    }
}
