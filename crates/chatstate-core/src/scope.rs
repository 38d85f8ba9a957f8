use tracing::trace;

use super::dispatcher::Applied;
use super::dispatcher::EventDispatcher;
use super::event::ServerEvent;

/// Caller-side filter that drops `session.diff` events for sessions other than the active
/// one. The dispatcher never applies it on its own; wrap `apply` with [`SessionScope::apply`]
/// to opt in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    active_session: String,
}

impl SessionScope {
    pub fn new(active_session: impl Into<String>) -> Self {
        Self {
            active_session: active_session.into(),
        }
    }

    pub fn active_session(&self) -> &str {
        self.active_session.as_str()
    }

    pub fn admits(&self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::SessionDiff(diff) => diff.session_id == self.active_session,
            ServerEvent::PermissionUpdated(_)
            | ServerEvent::PermissionReplied(_)
            | ServerEvent::Other(_) => true,
        }
    }

    /// Returns `true` when the active session changed; the caller then clears its diffs.
    pub fn switch_to(&mut self, session_id: impl Into<String>) -> bool {
        let session_id = session_id.into();
        if session_id == self.active_session {
            return false;
        }
        self.active_session = session_id;
        true
    }

    /// `None` when the event was filtered out.
    pub fn apply(&self, dispatcher: &mut EventDispatcher, event: &ServerEvent) -> Option<Applied> {
        if !self.admits(event) {
            trace!(
                kind = event.kind(),
                active = %self.active_session,
                "event filtered by session scope"
            );
            return None;
        }
        Some(dispatcher.apply(event))
    }
}
