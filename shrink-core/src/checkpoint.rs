//! Durable resumption record.
//!
//! The file is an envelope `{ version, digest, state }`. `digest` is the
//! BLAKE3 of the serialised `state`, so a truncated or hand-edited file is
//! detected even when it still parses. Any checkpoint that cannot be trusted
//! is discarded with a warning and the run starts fresh.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::SessionInfo;
use crate::error::Result;
use crate::stats::Counters;
use crate::util::atomic;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub processed_paths: BTreeSet<String>,
    pub counters: Counters,
    pub last_update_sequence: u64,
    #[serde(default)]
    pub session: SessionInfo,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CheckpointState {
    pub fn is_done(&self, relative_path: &str) -> bool {
        self.processed_paths.contains(relative_path)
    }

    /// Mark a task terminal. Returns false if it was already recorded.
    pub fn mark_done(&mut self, relative_path: &str) -> bool {
        let inserted = self.processed_paths.insert(relative_path.to_string());
        if inserted {
            self.last_update_sequence += 1;
        }
        inserted
    }

    /// Record a task found already done on disk. It was not processed by
    /// this state, so the sequence does not move.
    pub fn mark_existing(&mut self, relative_path: &str) -> bool {
        self.processed_paths.insert(relative_path.to_string())
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    digest: String,
    state: &'a CheckpointState,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    digest: String,
    state: CheckpointState,
}

#[derive(Debug)]
pub enum Loaded {
    Missing,
    Resumed(CheckpointState),
    /// Present but unusable; the reason is kept for diagnostics.
    Discarded(String),
}

impl Loaded {
    pub fn into_state(self) -> (CheckpointState, bool) {
        match self {
            Loaded::Resumed(s) => (s, true),
            Loaded::Missing | Loaded::Discarded(_) => (CheckpointState::default(), false),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

fn digest_of(state: &CheckpointState) -> Result<String> {
    let bytes = serde_json::to_vec(state)?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Never fails: a missing file is a fresh start, anything unreadable is
    /// logged and discarded.
    pub fn load(&self) -> Loaded {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Missing,
            Err(e) => return self.discard(format!("unreadable: {e}")),
        };
        let header: VersionHeader = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => return self.discard(format!("unparseable: {e}")),
        };
        if header.version != CHECKPOINT_VERSION {
            return self.discard(format!(
                "unsupported version {} (expected {CHECKPOINT_VERSION})",
                header.version
            ));
        }
        let env: EnvelopeIn = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => return self.discard(format!("malformed state: {e}")),
        };
        match digest_of(&env.state) {
            Ok(d) if d == env.digest => {
                debug!(path = %self.path.display(), processed = env.state.processed_paths.len(), "checkpoint loaded");
                Loaded::Resumed(env.state)
            }
            Ok(_) => self.discard("digest mismatch".to_string()),
            Err(e) => self.discard(format!("digest: {e}")),
        }
    }

    fn discard(&self, reason: String) -> Loaded {
        warn!(
            path = %self.path.display(),
            kind = %crate::error::ErrorKind::CheckpointCorrupt,
            %reason,
            "ignoring checkpoint, starting fresh"
        );
        Loaded::Discarded(reason)
    }

    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        let env = EnvelopeOut {
            version: CHECKPOINT_VERSION,
            digest: digest_of(state)?,
            state,
        };
        atomic::write_json(&self.path, &env, "save checkpoint")
    }

    pub fn clear(&self) -> Result<()> {
        atomic::remove_if_exists(&self.path).map_err(|source| {
            crate::error::ShrinkError::Durability {
                operation: "remove checkpoint",
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> CheckpointState {
        let mut s = CheckpointState::default();
        s.mark_done("a/one.pdf");
        s.mark_done("b/two.pdf");
        s.counters.attempted = 2;
        s.counters.buckets.good = 1;
        s.counters.errors.insert(ErrorKind::TransformFailure, 1);
        s.session = SessionInfo::fresh(OffsetDateTime::UNIX_EPOCH);
        s
    }

    #[test]
    fn save_then_load_resumes_identical_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        let s = sample();
        store.save(&s).unwrap();
        match store.load() {
            Loaded::Resumed(got) => assert_eq!(got, s),
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        assert!(matches!(store.load(), Loaded::Missing));
    }

    #[test]
    fn garbage_and_tampering_degrade_to_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let store = CheckpointStore::new(&path);

        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(store.load(), Loaded::Discarded(_)));

        store.save(&sample()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("a/one.pdf", "a/evil.pdf")).unwrap();
        let (state, resumed) = store.load().into_state();
        assert!(!resumed);
        assert!(state.processed_paths.is_empty());
    }

    #[test]
    fn unknown_version_degrades_to_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        fs::write(&path, br#"{"version": 99, "whatever": [1,2,3]}"#).unwrap();
        let store = CheckpointStore::new(&path);
        match store.load() {
            Loaded::Discarded(reason) => assert!(reason.contains("99")),
            other => panic!("expected discard, got {other:?}"),
        }
    }

    #[test]
    fn mark_done_is_idempotent_and_sequences() {
        let mut s = CheckpointState::default();
        assert!(s.mark_done("x"));
        assert!(!s.mark_done("x"));
        assert_eq!(s.last_update_sequence, 1);
        assert!(s.is_done("x"));
    }

    #[test]
    fn clear_removes_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        store.save(&sample()).unwrap();
        assert!(store.exists());
        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
    }
}
