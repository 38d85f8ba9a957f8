use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::dispatcher::Applied;
use super::dispatcher::EventDispatcher;
use super::dispatcher::StateSnapshot;
use super::error::TranscriptError;
use super::event::EventEnvelope;
use super::event::ServerEvent;
use super::scope::SessionScope;

pub const TRANSCRIPT_SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: EventEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    pub version: u8,
    pub seq: u64,
    pub state: StateSnapshot,
}

/// Only the version is read before the state's shape is trusted.
#[derive(Debug, Deserialize)]
struct SnapshotHeader {
    version: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub applied: usize,
    pub unchanged: usize,
    pub filtered: usize,
    pub undecodable: usize,
}

/// Append-only JSONL log of bus events, one envelope per line.
#[derive(Debug)]
pub struct EventTranscript {
    path: PathBuf,
    snapshot_path: PathBuf,
    next_seq: u64,
}

impl EventTranscript {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TranscriptError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TranscriptError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        let snapshot_path = path.with_extension("snapshot.json");
        Ok(Self {
            path,
            snapshot_path,
            next_seq,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn append(&mut self, event: &ServerEvent) -> Result<u64, TranscriptError> {
        let seq = self.next_seq;
        let record = TranscriptRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event: event.to_envelope()?,
        };
        let line = serde_json::to_string(&record)?;
        append_line(self.path.as_path(), line.as_str()).map_err(|source| TranscriptError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.next_seq = self.next_seq.saturating_add(1);
        Ok(seq)
    }

    pub fn load(&self) -> Result<Vec<TranscriptRecord>, TranscriptError> {
        load_records(self.path.as_path())
    }

    pub fn load_since(&self, seq_exclusive: u64) -> Result<Vec<TranscriptRecord>, TranscriptError> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }

    pub fn save_snapshot(&self, snapshot: &TranscriptSnapshot) -> Result<(), TranscriptError> {
        let encoded = serde_json::to_vec(snapshot)?;
        std::fs::write(&self.snapshot_path, encoded).map_err(|source| TranscriptError::Io {
            path: self.snapshot_path.clone(),
            source,
        })
    }

    pub fn load_snapshot(&self) -> Result<Option<TranscriptSnapshot>, TranscriptError> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.snapshot_path).map_err(|source| TranscriptError::Io {
            path: self.snapshot_path.clone(),
            source,
        })?;
        let header = serde_json::from_slice::<SnapshotHeader>(&bytes)?;
        if header.version != TRANSCRIPT_SNAPSHOT_VERSION {
            warn!(
                version = header.version,
                path = %self.snapshot_path.display(),
                "ignoring snapshot with unsupported version"
            );
            return Ok(None);
        }
        let snapshot = serde_json::from_slice::<TranscriptSnapshot>(&bytes)?;
        Ok(Some(snapshot))
    }
}

pub fn replay(
    records: &[TranscriptRecord],
    scope: Option<&SessionScope>,
) -> (EventDispatcher, ReplayStats) {
    replay_from(EventDispatcher::new(), records, scope)
}

/// Applies `records` in file order on top of `dispatcher`. Undecodable records are counted
/// and skipped.
pub fn replay_from(
    mut dispatcher: EventDispatcher,
    records: &[TranscriptRecord],
    scope: Option<&SessionScope>,
) -> (EventDispatcher, ReplayStats) {
    let mut stats = ReplayStats::default();
    for record in records {
        let event = match ServerEvent::decode(record.event.clone()) {
            Ok(event) => event,
            Err(err) => {
                warn!(seq = record.seq, error = %err, "skipping undecodable transcript event");
                stats.undecodable += 1;
                continue;
            }
        };
        let applied = match scope {
            Some(scope) => scope.apply(&mut dispatcher, &event),
            None => Some(dispatcher.apply(&event)),
        };
        match applied {
            Some(Applied::Permissions | Applied::Diffs) => stats.applied += 1,
            Some(Applied::Unchanged) => stats.unchanged += 1,
            None => stats.filtered += 1,
        }
    }
    (dispatcher, stats)
}

fn load_records(path: &Path) -> Result<Vec<TranscriptRecord>, TranscriptError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let io_err = |source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed transcript line");
            }
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
