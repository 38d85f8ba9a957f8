use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::diff::FileDiffEntry;
use super::error::DecodeError;
use super::permission::PermissionRequest;

pub const PERMISSION_UPDATED: &str = "permission.updated";
pub const PERMISSION_REPLIED: &str = "permission.replied";
pub const SESSION_DIFF: &str = "session.diff";

/// A frame exactly as the host bus sends it: a `type` tag plus an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Value,
}

impl EventEnvelope {
    pub fn new(kind: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionReply {
    #[serde(rename = "permissionID")]
    pub permission_id: String,
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDiff {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(default)]
    pub diff: Vec<FileDiffEntry>,
}

/// Typed view of a bus event.
///
/// Kinds this version does not know about decode to [`ServerEvent::Other`] and keep their
/// envelope, so they can be recorded and forwarded without loss.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    PermissionUpdated(PermissionRequest),
    PermissionReplied(PermissionReply),
    SessionDiff(SessionDiff),
    Other(EventEnvelope),
}

impl ServerEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::PermissionUpdated(_) => PERMISSION_UPDATED,
            Self::PermissionReplied(_) => PERMISSION_REPLIED,
            Self::SessionDiff(_) => SESSION_DIFF,
            Self::Other(envelope) => envelope.kind.as_str(),
        }
    }

    pub fn from_json(frame: &str) -> Result<Self, DecodeError> {
        let envelope =
            serde_json::from_str::<EventEnvelope>(frame).map_err(DecodeError::Json)?;
        Self::decode(envelope)
    }

    pub fn decode(envelope: EventEnvelope) -> Result<Self, DecodeError> {
        let EventEnvelope { kind, properties } = envelope;
        let event = match kind.as_str() {
            PERMISSION_UPDATED => Self::PermissionUpdated(payload(&kind, properties)?),
            PERMISSION_REPLIED => Self::PermissionReplied(payload(&kind, properties)?),
            SESSION_DIFF => Self::SessionDiff(payload(&kind, properties)?),
            _ => Self::Other(EventEnvelope { kind, properties }),
        };
        Ok(event)
    }

    pub fn to_envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        let properties = match self {
            Self::PermissionUpdated(request) => serde_json::to_value(request)?,
            Self::PermissionReplied(reply) => serde_json::to_value(reply)?,
            Self::SessionDiff(diff) => serde_json::to_value(diff)?,
            Self::Other(envelope) => return Ok(envelope.clone()),
        };
        Ok(EventEnvelope::new(self.kind(), properties))
    }
}

fn payload<T: DeserializeOwned>(kind: &str, properties: Value) -> Result<T, DecodeError> {
    serde_json::from_value(properties).map_err(|source| DecodeError::Payload {
        kind: kind.to_string(),
        source,
    })
}
