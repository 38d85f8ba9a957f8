use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use super::diff::FileDiffEntry;
use super::diff::FileDiffStore;
use super::event::ServerEvent;
use super::permission::PermissionTable;

/// A pure reconciliation unit.
///
/// `reduce` must return a value for which `same_snapshot` holds against `self` whenever
/// the event does not concern the unit; consumers rely on that to skip re-reads.
pub trait Reduce: Sized {
    fn reduce(&self, event: &ServerEvent) -> Self;

    fn same_snapshot(&self, other: &Self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Permissions,
    Diffs,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub permissions: PermissionTable,
    pub diffs: FileDiffStore,
}

/// Feeds each event to both reconciliation units in arrival order.
///
/// Events are never reordered or coalesced. A stale `session.diff` delivered after a newer
/// one wins because it was applied last.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    permissions: PermissionTable,
    diffs: FileDiffStore,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            permissions: snapshot.permissions,
            diffs: snapshot.diffs,
        }
    }

    pub fn apply(&mut self, event: &ServerEvent) -> Applied {
        let permissions = self.permissions.reduce(event);
        let diffs = self.diffs.reduce(event);

        if !permissions.same_snapshot(&self.permissions) {
            self.permissions = permissions;
            debug!(
                kind = event.kind(),
                outstanding = self.permissions.len(),
                "permission table updated"
            );
            Applied::Permissions
        } else if !diffs.same_snapshot(&self.diffs) {
            self.diffs = diffs;
            debug!(files = self.diffs.len(), "file diffs replaced");
            Applied::Diffs
        } else {
            trace!(kind = event.kind(), "event left state unchanged");
            Applied::Unchanged
        }
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    pub fn diffs(&self) -> &FileDiffStore {
        &self.diffs
    }

    pub fn set_diffs(&mut self, diffs: Vec<FileDiffEntry>) {
        self.diffs.set_diffs(diffs);
        debug!(files = self.diffs.len(), "file diffs set directly");
    }

    pub fn clear_diffs(&mut self) {
        self.diffs.clear_diffs();
        debug!("file diffs cleared");
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            permissions: self.permissions.clone(),
            diffs: self.diffs.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
