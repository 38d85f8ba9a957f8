use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use super::dispatcher::Reduce;
use super::event::ServerEvent;

/// An outstanding permission prompt.
///
/// Only `id` is interpreted. Everything the host sends besides `id` and `title` is kept
/// verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PermissionRequest {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields: Map::new(),
        }
    }

    /// `id` and `title` are named fields; extra fields under those keys are dropped.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !is_named_field(&key) {
            self.fields.insert(key, value);
        }
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.fields.get("sessionID").and_then(Value::as_str)
    }
}

fn is_named_field(key: &str) -> bool {
    matches!(key, "id" | "title")
}

/// Outstanding permission requests keyed by id.
///
/// Snapshots share storage until one of them is reduced into a new table, so a reader
/// holding an old table never observes later events.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PermissionTable {
    entries: Arc<IndexMap<String, PermissionRequest>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&PermissionRequest> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iteration follows first insertion; callers must not depend on it.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRequest> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn for_session<'a>(
        &'a self,
        session_id: &'a str,
    ) -> impl Iterator<Item = &'a PermissionRequest> + 'a {
        self.iter()
            .filter(move |request| request.session_id() == Some(session_id))
    }

    fn upsert(&self, request: &PermissionRequest) -> Self {
        let mut entries = IndexMap::clone(&self.entries);
        entries.insert(request.id.clone(), request.clone());
        Self {
            entries: Arc::new(entries),
        }
    }

    fn remove(&self, id: &str) -> Self {
        if !self.entries.contains_key(id) {
            return self.clone();
        }
        let mut entries = IndexMap::clone(&self.entries);
        entries.shift_remove(id);
        Self {
            entries: Arc::new(entries),
        }
    }
}

/// Stored keys are not trusted: entries are re-keyed by their own `id` so a later reply
/// can always remove them.
impl<'de> Deserialize<'de> for PermissionTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = IndexMap::<String, PermissionRequest>::deserialize(deserializer)?;
        let mut entries = IndexMap::with_capacity(stored.len());
        for (key, request) in stored {
            if key != request.id {
                warn!(key = %key, id = %request.id, "re-keying permission request by its id");
            }
            entries.insert(request.id.clone(), request);
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }
}

impl Reduce for PermissionTable {
    fn reduce(&self, event: &ServerEvent) -> Self {
        match event {
            ServerEvent::PermissionUpdated(request) => self.upsert(request),
            ServerEvent::PermissionReplied(reply) => self.remove(&reply.permission_id),
            ServerEvent::SessionDiff(_) | ServerEvent::Other(_) => self.clone(),
        }
    }

    fn same_snapshot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl PartialEq for PermissionTable {
    fn eq(&self, other: &Self) -> bool {
        self.same_snapshot(other) || self.entries == other.entries
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::event::EventEnvelope;
    use crate::event::PermissionReply;

    fn updated(id: &str, title: &str) -> ServerEvent {
        ServerEvent::PermissionUpdated(PermissionRequest::new(id, title))
    }

    fn replied(id: &str) -> ServerEvent {
        ServerEvent::PermissionReplied(PermissionReply {
            permission_id: id.to_string(),
            session_id: None,
            response: None,
        })
    }

    #[test]
    fn update_then_reply_round_trips_to_empty() {
        let table = PermissionTable::new().reduce(&updated("perm1", "allow bash"));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("perm1").map(|request| request.title.as_str()),
            Some("allow bash")
        );

        let table = table.reduce(&replied("perm1"));
        assert!(table.is_empty());
    }

    #[test]
    fn repeated_update_replaces_without_growing() {
        let table = PermissionTable::new()
            .reduce(&updated("perm1", "first"))
            .reduce(&updated("perm2", "other"))
            .reduce(&updated("perm1", "second"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("perm1").map(|r| r.title.as_str()), Some("second"));
        let ids: Vec<&str> = table.ids().collect();
        assert_eq!(ids, vec!["perm1", "perm2"]);
    }

    #[test]
    fn reply_for_absent_id_keeps_same_snapshot() {
        let table = PermissionTable::new().reduce(&updated("perm1", "allow bash"));
        let next = table.reduce(&replied("perm9"));

        assert!(next.same_snapshot(&table));
    }

    #[test]
    fn reply_before_update_does_not_block_later_update() {
        let table = PermissionTable::new()
            .reduce(&replied("perm1"))
            .reduce(&updated("perm1", "late"));

        assert!(table.contains("perm1"));
    }

    #[test]
    fn unrelated_events_keep_same_snapshot() {
        let table = PermissionTable::new().reduce(&updated("perm1", "allow bash"));
        let other = ServerEvent::Other(EventEnvelope::new("message.updated", json!({})));

        assert!(table.reduce(&other).same_snapshot(&table));
    }

    #[test]
    fn older_snapshot_is_unaffected_by_later_reduce() {
        let before = PermissionTable::new().reduce(&updated("perm1", "allow bash"));
        let after = before.reduce(&replied("perm1")).reduce(&updated("perm2", "edit"));

        assert!(before.contains("perm1"));
        assert!(!before.contains("perm2"));
        assert!(!after.contains("perm1"));
    }

    #[test]
    fn removal_keeps_remaining_order() {
        let table = PermissionTable::new()
            .reduce(&updated("a", "a"))
            .reduce(&updated("b", "b"))
            .reduce(&updated("c", "c"))
            .reduce(&replied("b"));

        let ids: Vec<&str> = table.ids().collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn for_session_filters_on_opaque_session_field() {
        let table = PermissionTable::new()
            .reduce(&ServerEvent::PermissionUpdated(
                PermissionRequest::new("p1", "one").with_field("sessionID", json!("s1")),
            ))
            .reduce(&ServerEvent::PermissionUpdated(
                PermissionRequest::new("p2", "two").with_field("sessionID", json!("s2")),
            ))
            .reduce(&updated("p3", "no session"));

        let ids: Vec<&str> = table
            .for_session("s1")
            .map(|request| request.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p1"]);
    }

    #[test]
    fn with_field_drops_named_keys() {
        let request = PermissionRequest::new("perm1", "allow bash")
            .with_field("id", json!("other"))
            .with_field("title", json!("other title"))
            .with_field("pattern", json!("git *"));

        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({ "id": "perm1", "title": "allow bash", "pattern": "git *" })
        );
    }

    #[test]
    fn deserialized_table_is_keyed_by_request_id() {
        let table: PermissionTable = serde_json::from_value(json!({
            "stale-key": { "id": "perm1", "title": "allow bash" },
        }))
        .expect("deserialize");

        let ids: Vec<&str> = table.ids().collect();
        assert_eq!(ids, vec!["perm1"]);
        assert!(table.reduce(&replied("perm1")).is_empty());
    }

    #[test]
    fn serializes_as_id_keyed_object() {
        let table = PermissionTable::new().reduce(&updated("perm1", "allow bash"));

        assert_eq!(
            serde_json::to_value(&table).expect("serialize"),
            json!({ "perm1": { "id": "perm1", "title": "allow bash" } })
        );
    }
}
