use serde_json::json;
use serde_json::Value;

pub(super) use super::Applied;
pub(super) use super::EventDispatcher;
pub(super) use super::Reduce;
pub(super) use super::StateSnapshot;
pub(super) use crate::diff::FileDiffEntry;
pub(super) use crate::diff::FileDiffStore;
pub(super) use crate::event::EventEnvelope;
pub(super) use crate::event::ServerEvent;
pub(super) use crate::permission::PermissionTable;

mod forward_compat;

fn event(frame: Value) -> ServerEvent {
    ServerEvent::from_json(&frame.to_string()).expect("decode frame")
}

fn updated(id: &str, title: &str) -> ServerEvent {
    event(json!({
        "type": "permission.updated",
        "properties": { "id": id, "title": title },
    }))
}

fn replied(id: &str) -> ServerEvent {
    event(json!({
        "type": "permission.replied",
        "properties": { "permissionID": id },
    }))
}

fn session_diff(session_id: &str, files: &[&str]) -> ServerEvent {
    let diff: Vec<Value> = files
        .iter()
        .map(|file| {
            json!({
                "file": file,
                "before": "x",
                "after": "y",
                "additions": 1,
                "deletions": 1,
            })
        })
        .collect();
    event(json!({
        "type": "session.diff",
        "properties": { "sessionID": session_id, "diff": diff },
    }))
}

fn other(kind: &str) -> ServerEvent {
    event(json!({ "type": kind, "properties": {} }))
}

fn diff_files(dispatcher: &EventDispatcher) -> Vec<String> {
    dispatcher
        .diffs()
        .entries()
        .iter()
        .map(|entry| entry.file.clone())
        .collect()
}

fn permission_ids(dispatcher: &EventDispatcher) -> Vec<String> {
    dispatcher
        .permissions()
        .ids()
        .map(str::to_string)
        .collect()
}
