use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn unknown_kinds_are_unchanged_for_both_units() {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.apply(&updated("perm1", "allow bash"));
    dispatcher.apply(&session_diff("s1", &["a.ts"]));
    let before = dispatcher.snapshot();

    for kind in ["message.updated", "session.idle", "lsp.updated", "future.kind.v2"] {
        assert_eq!(dispatcher.apply(&other(kind)), Applied::Unchanged);
    }

    assert!(dispatcher.permissions().same_snapshot(&before.permissions));
    assert!(dispatcher.diffs().same_snapshot(&before.diffs));
}

#[test]
fn unknown_kind_with_arbitrary_payload_is_unchanged() {
    let mut dispatcher = EventDispatcher::new();
    let event = ServerEvent::Other(EventEnvelope::new(
        "message.part.updated",
        json!({ "part": { "id": 1, "text": [1, 2, 3] } }),
    ));

    assert_eq!(dispatcher.apply(&event), Applied::Unchanged);
    assert_eq!(dispatcher.snapshot(), StateSnapshot::default());
}

#[test]
fn reducers_return_identity_for_foreign_events() {
    let table = PermissionTable::new().reduce(&updated("perm1", "allow bash"));
    let store = FileDiffStore::new().reduce(&session_diff("s1", &["a.ts"]));

    assert!(table.reduce(&session_diff("s1", &["b.ts"])).same_snapshot(&table));
    assert!(store.reduce(&replied("perm1")).same_snapshot(&store));
    assert!(store.reduce(&other("message.updated")).same_snapshot(&store));
}
