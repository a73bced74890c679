use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ErrorKind;

/// One unit of work discovered under the source root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTask {
    /// `/`-separated path relative to the source root; the checkpoint key.
    pub relative_path: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Excellent,
    Good,
    Moderate,
    Low,
    None,
    Error,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Excellent,
        Bucket::Good,
        Bucket::Moderate,
        Bucket::Low,
        Bucket::None,
        Bucket::Error,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Bucket::Excellent => "excellent",
            Bucket::Good => "good",
            Bucket::Moderate => "moderate",
            Bucket::Low => "low",
            Bucket::None => "none",
            Bucket::Error => "error",
        }
    }

    /// True when the transformed output replaced the original in the mirror.
    pub const fn kept_output(self) -> bool {
        matches!(
            self,
            Bucket::Excellent | Bucket::Good | Bucket::Moderate | Bucket::Low
        )
    }
}

/// Immutable record of one attempted task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub relative_path: String,
    pub original_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size: Option<u64>,
    pub bucket: Bucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ProcessingOutcome {
    /// Bytes removed from the tree by this outcome; never negative.
    pub fn bytes_saved(&self) -> u64 {
        match self.result_size {
            Some(r) if self.bucket.kept_output() => self.original_size.saturating_sub(r),
            _ => 0,
        }
    }

    /// Size of whatever ended up representing this file in the mirror.
    pub fn final_size(&self) -> u64 {
        match self.result_size {
            Some(r) if self.bucket.kept_output() => r,
            _ => self.original_size,
        }
    }
}

/// Bookkeeping about the sequence of runs that share one checkpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub first_start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub current_start: Option<OffsetDateTime>,
    #[serde(default)]
    pub resume_count: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_resume: Option<OffsetDateTime>,
}

impl SessionInfo {
    pub fn fresh(now: OffsetDateTime) -> Self {
        Self {
            first_start: Some(now),
            current_start: Some(now),
            resume_count: 0,
            last_resume: None,
        }
    }

    pub fn resumed(mut self, now: OffsetDateTime) -> Self {
        self.resume_count += 1;
        self.last_resume = Some(now);
        self.current_start = Some(now);
        if self.first_start.is_none() {
            self.first_start = Some(now);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(bucket: Bucket, orig: u64, res: Option<u64>) -> ProcessingOutcome {
        ProcessingOutcome {
            relative_path: "a.pdf".into(),
            original_size: orig,
            result_size: res,
            bucket,
            error_kind: None,
            detail: None,
            timestamp: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn rejected_outputs_save_nothing() {
        assert_eq!(outcome(Bucket::Good, 100, Some(60)).bytes_saved(), 40);
        assert_eq!(outcome(Bucket::None, 100, Some(120)).bytes_saved(), 0);
        assert_eq!(outcome(Bucket::None, 100, Some(120)).final_size(), 100);
        assert_eq!(outcome(Bucket::Error, 100, None).bytes_saved(), 0);
    }

    #[test]
    fn resume_bumps_count_and_keeps_first_start() {
        let t0 = OffsetDateTime::UNIX_EPOCH;
        let t1 = t0 + time::Duration::hours(1);
        let s = SessionInfo::fresh(t0).resumed(t1);
        assert_eq!(s.resume_count, 1);
        assert_eq!(s.first_start, Some(t0));
        assert_eq!(s.last_resume, Some(t1));
        assert_eq!(s.current_start, Some(t1));
    }
}
