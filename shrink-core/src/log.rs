//! Rotating observability log: an always-current summary plus a bounded
//! window of the most recent per-file outcomes, rewritten atomically.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::{ProcessingOutcome, SessionInfo};
use crate::error::Result;
use crate::stats::Counters;
use crate::util::atomic;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub status: RunStatus,
    pub total_discovered: u64,
    /// Distinct files with a terminal outcome, across resumes.
    pub total_processed: u64,
    pub skipped: u64,
    pub enumeration_errors: u64,
    pub completion_percentage: f64,
    pub counters: Counters,
    pub original_size: String,
    pub final_size: String,
    pub space_saved: String,
    pub session: SessionInfo,
    #[serde(with = "time::serde::rfc3339")]
    pub execution_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    pub duration_seconds: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    pub history_limit: usize,
    pub entries_in_history: usize,
}

#[derive(Serialize)]
struct LogFileOut<'a> {
    log_info: LogInfo,
    summary: &'a LogSummary,
    history: &'a VecDeque<ProcessingOutcome>,
}

#[derive(Deserialize)]
struct LogFileIn {
    #[serde(default)]
    summary: Option<LogSummary>,
    #[serde(default)]
    history: Vec<ProcessingOutcome>,
}

#[derive(Clone, Debug, Default)]
pub struct PersistedLog {
    pub summary: Option<LogSummary>,
    pub history: Vec<ProcessingOutcome>,
}

/// Read a log file for inspection. Missing or unparseable files yield an
/// empty log; a reader racing a flush may briefly see the file missing.
pub fn read_log(path: &Path) -> PersistedLog {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "log unreadable");
            }
            return PersistedLog::default();
        }
    };
    match serde_json::from_slice::<LogFileIn>(&bytes) {
        Ok(f) => PersistedLog {
            summary: f.summary,
            history: f.history,
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "log unparseable, starting a new one");
            PersistedLog::default()
        }
    }
}

#[derive(Debug)]
pub struct RotatingLogStore {
    path: PathBuf,
    capacity: usize,
    history: VecDeque<ProcessingOutcome>,
    /// Paths currently in `history`.
    in_window: HashSet<String>,
}

impl RotatingLogStore {
    /// Empty store; nothing on disk is read.
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
            history: VecDeque::new(),
            in_window: HashSet::new(),
        }
    }

    /// Continue the window persisted by an earlier run, keeping its newest
    /// entries. Returns the previous summary alongside.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> (Self, Option<LogSummary>) {
        let mut store = Self::new(path, capacity);
        let prev = read_log(&store.path);
        for o in prev.history {
            store.append(o);
        }
        debug!(path = %store.path.display(), entries = store.history.len(), "log opened");
        (store, prev.summary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn history(&self) -> impl Iterator<Item = &ProcessingOutcome> {
        self.history.iter()
    }

    /// Add an outcome, evicting the oldest entries past capacity. An older
    /// entry for the same path is replaced so the window never holds two
    /// outcomes for one file.
    pub fn append(&mut self, outcome: ProcessingOutcome) {
        if !self.in_window.insert(outcome.relative_path.clone()) {
            self.history
                .retain(|o| o.relative_path != outcome.relative_path);
        }
        self.history.push_back(outcome);
        while self.history.len() > self.capacity {
            if let Some(old) = self.history.pop_front() {
                self.in_window.remove(&old.relative_path);
            }
        }
    }

    pub fn flush(&self, summary: &LogSummary) -> Result<()> {
        let file = LogFileOut {
            log_info: LogInfo {
                last_update: summary.last_update,
                history_limit: self.capacity,
                entries_in_history: self.history.len(),
            },
            summary,
            history: &self.history,
        };
        atomic::write_json(&self.path, &file, "flush log")
    }
}
