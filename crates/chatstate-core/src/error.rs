use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a raw wire frame into a [`crate::event::ServerEvent`].
///
/// Reduction itself never fails; this only exists at the decode boundary.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not an event envelope: {0}")]
    Json(#[source] serde_json::Error),
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcript io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transcript json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
