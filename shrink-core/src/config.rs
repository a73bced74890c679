use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::Thresholds;
use crate::error::{Result, ShrinkError};
use crate::transform::TransformerConfig;

pub const DEFAULT_OUTPUT_DIR: &str = "compressed";
pub const STATE_DIR: &str = ".shrink";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const LOG_FILE: &str = "log.json";

/// Settings for one batch. Every field except `source_root` has a default,
/// so a config file only needs to name what differs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub source_root: PathBuf,
    /// Mirror root; `<source_root>/compressed` when unset.
    pub output_root: Option<PathBuf>,
    /// Matched case-insensitively, with or without a leading dot.
    pub extensions: Vec<String>,
    /// Holds the checkpoint and the rotating log; `<output_root>/.shrink` when unset.
    pub state_dir: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    /// Persist checkpoint and log every K completed files.
    pub checkpoint_every: u64,
    pub history_capacity: usize,
    pub thresholds: Thresholds,
    pub transformer: TransformerConfig,
    /// Without a checkpoint, treat a non-empty mirrored output as already done.
    pub trust_existing_output: bool,
    /// Copy the original into the mirror when the transformed output is rejected.
    pub mirror_rejected: bool,
    /// Copy files that do not match `extensions` into the mirror after the batch.
    pub copy_other_files: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            output_root: None,
            extensions: vec!["pdf".to_string()],
            state_dir: None,
            checkpoint_path: None,
            log_path: None,
            checkpoint_every: 10,
            history_capacity: 1000,
            thresholds: Thresholds::default(),
            transformer: TransformerConfig::default(),
            trust_existing_output: true,
            mirror_rejected: true,
            copy_other_files: false,
        }
    }
}

impl RunConfig {
    pub fn for_source(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            ShrinkError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ShrinkError::Config(format!("invalid {}: {e}", path.display())))
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.source_root.join(DEFAULT_OUTPUT_DIR))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.output_root().join(STATE_DIR))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join(CHECKPOINT_FILE))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join(LOG_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_root.as_os_str().is_empty() {
            return Err(ShrinkError::Config("source_root is required".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(ShrinkError::Config("checkpoint_every must be at least 1".into()));
        }
        if self.history_capacity == 0 {
            return Err(ShrinkError::Config("history_capacity must be at least 1".into()));
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ShrinkError::Config("at least one extension is required".into()));
        }
        if self.output_root() == self.source_root {
            return Err(ShrinkError::Config(
                "output_root must differ from source_root".into(),
            ));
        }
        self.thresholds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_paths_from_source() {
        let c = RunConfig::for_source("/data/docs");
        assert_eq!(c.output_root(), PathBuf::from("/data/docs/compressed"));
        assert_eq!(
            c.checkpoint_path(),
            PathBuf::from("/data/docs/compressed/.shrink/checkpoint.json")
        );
        assert_eq!(c.log_path(), PathBuf::from("/data/docs/compressed/.shrink/log.json"));
        assert_eq!(c.checkpoint_every, 10);
        assert_eq!(c.history_capacity, 1000);
        c.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("cfg.json");
        fs::write(
            &p,
            r#"{"source_root":"/in","output_root":"/out","checkpoint_every":5,
               "transformer":{"kind":"copy"},"thresholds":{"excellent":0.6}}"#,
        )
        .unwrap();
        let c = RunConfig::from_json_file(&p).unwrap();
        assert_eq!(c.checkpoint_every, 5);
        assert_eq!(c.transformer, TransformerConfig::Copy);
        assert_eq!(c.thresholds.excellent, 0.6);
        assert_eq!(c.thresholds.good, 0.3);
        assert_eq!(c.extensions, vec!["pdf".to_string()]);
        assert_eq!(c.state_dir(), PathBuf::from("/out/.shrink"));
    }

    #[test]
    fn validation_rejects_impossible_values() {
        assert!(RunConfig::default().validate().is_err());
        let mut c = RunConfig::for_source("/in");
        c.checkpoint_every = 0;
        assert!(c.validate().is_err());
        let mut c = RunConfig::for_source("/in");
        c.output_root = Some("/in".into());
        assert!(c.validate().is_err());
        let mut c = RunConfig::for_source("/in");
        c.extensions = vec![".".into()];
        assert!(c.validate().is_err());
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = RunConfig::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ShrinkError::Config(_)));
    }
}
