//! Sequential, resumable batch loop.
//!
//! Starting loads the checkpoint and enumerates once. A fresh start settles
//! outputs already on disk and saves a checkpoint before any transform, so
//! every later interruption resumes from it. Running processes one
//! task at a time and persists every K completions; Finalizing flushes once
//! more, removes the checkpoint and reports. A process killed while Running
//! loses at most the work done since the last periodic save.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointState, CheckpointStore, Loaded};
use crate::classify::{Observation, Thresholds, classify};
use crate::config::RunConfig;
use crate::domain::{Bucket, FileTask, ProcessingOutcome, SessionInfo};
use crate::enumerate::{Enumeration, FileEnumerator};
use crate::error::{ErrorKind, Result, ShrinkError};
use crate::log::{LogSummary, RotatingLogStore, RunStatus};
use crate::report::{RunReport, format_size};
use crate::stats::StatsAggregator;
use crate::transform::Transformer;
use crate::util::atomic;

const STAGING_SUFFIX: &str = ".part";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// Where a transformer writes before the result is accepted.
pub fn staging_path(output: &Path) -> PathBuf {
    with_suffix(output, STAGING_SUFFIX)
}

/// Outcome for an output found on disk without a checkpoint entry, measured
/// the same way a fresh transform would be.
fn adopted_outcome(task: &FileTask, result: u64, thresholds: &Thresholds) -> ProcessingOutcome {
    let original = fs::metadata(&task.source).map(|m| m.len()).unwrap_or(0);
    let c = classify(Observation::Transformed { original, result }, thresholds);
    ProcessingOutcome {
        relative_path: task.relative_path.clone(),
        original_size: original,
        result_size: Some(result),
        bucket: c.bucket,
        error_kind: c.error_kind,
        detail: Some("existing output adopted".into()),
        timestamp: OffsetDateTime::now_utc(),
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    discovered: u64,
    processed: u64,
    skipped: u64,
    enumeration_errors: u64,
}

pub struct BatchDriver<'t> {
    config: RunConfig,
    transformer: &'t dyn Transformer,
}

impl<'t> BatchDriver<'t> {
    pub fn new(config: RunConfig, transformer: &'t dyn Transformer) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transformer,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunReport> {
        let clock = Instant::now();
        let started_at = OffsetDateTime::now_utc();
        let cfg = &self.config;
        let output_root = cfg.output_root();
        let checkpoints = CheckpointStore::new(cfg.checkpoint_path());

        let loaded = checkpoints.load();
        let checkpoint_discarded = matches!(loaded, Loaded::Discarded(_));
        let (mut state, resumed) = loaded.into_state();
        let (mut log, previous) = RotatingLogStore::open(cfg.log_path(), cfg.history_capacity);

        if resumed {
            state.session = std::mem::take(&mut state.session).resumed(started_at);
            info!(
                processed = state.processed_paths.len(),
                resume = state.session.resume_count,
                "resuming from checkpoint"
            );
        } else {
            state = CheckpointState {
                session: SessionInfo::fresh(started_at),
                ..CheckpointState::default()
            };
        }

        fs::create_dir_all(&output_root).map_err(|source| ShrinkError::Durability {
            operation: "create output root",
            path: output_root.clone(),
            source,
        })?;

        let enumerator = FileEnumerator::new(&cfg.source_root, &output_root, &cfg.extensions);
        let Enumeration {
            tasks,
            others,
            errors,
        } = enumerator.scan()?;
        let mut tally = Tally {
            discovered: tasks.len() as u64,
            enumeration_errors: errors.len() as u64,
            ..Tally::default()
        };
        info!(
            source = %cfg.source_root.display(),
            output = %output_root.display(),
            discovered = tally.discovered,
            transformer = self.transformer.name(),
            "starting batch"
        );

        let mut stats = StatsAggregator::seeded(state.counters.clone());
        if !resumed {
            self.settle_existing(&tasks, previous, &mut state, &mut stats, &mut log);
            // from here on an interrupted run resumes instead of guessing from disk
            let summary = self.summary(RunStatus::InProgress, &tally, &state, &stats, started_at, &clock);
            persist(&checkpoints, &mut state, &stats, &log, &summary)?;
        }

        for task in &tasks {
            if state.is_done(&task.relative_path) {
                tally.skipped += 1;
                continue;
            }

            let outcome = self.process(task)?;
            stats.apply(&outcome);
            state.mark_done(&outcome.relative_path);
            log.append(outcome);
            tally.processed += 1;

            if state.last_update_sequence % cfg.checkpoint_every == 0 {
                let summary = self.summary(RunStatus::InProgress, &tally, &state, &stats, started_at, &clock);
                persist(&checkpoints, &mut state, &stats, &log, &summary)?;
                info!(
                    done = state.processed_paths.len(),
                    total = tally.discovered,
                    percent = summary.completion_percentage,
                    "progress saved"
                );
            }
        }

        let copied_other = if cfg.copy_other_files {
            copy_other_files(&others)
        } else {
            0
        };

        let summary = self.summary(RunStatus::Completed, &tally, &state, &stats, started_at, &clock);
        persist(&checkpoints, &mut state, &stats, &log, &summary)?;
        checkpoints.clear()?;

        let report = RunReport {
            discovered: tally.discovered,
            processed: tally.processed,
            skipped: tally.skipped,
            copied_other,
            enumeration_errors: tally.enumeration_errors,
            resumed,
            checkpoint_discarded,
            resume_count: state.session.resume_count,
            totals: stats.snapshot(),
            elapsed: clock.elapsed(),
        };
        info!(
            processed = report.processed,
            skipped = report.skipped,
            saved = %format_size(report.totals.bytes_saved),
            "batch complete"
        );
        Ok(report)
    }

    /// Final name of a kept output.
    fn kept_path(&self, task: &FileTask) -> PathBuf {
        match self.transformer.output_extension() {
            Some(ext) => with_suffix(&task.output, &format!(".{ext}")),
            None => task.output.clone(),
        }
    }

    /// Size of an output already on disk that counts as done: non-empty, or
    /// as empty as its source.
    fn existing_output(&self, task: &FileTask) -> Option<u64> {
        let source_empty = fs::metadata(&task.source)
            .map(|m| m.len() == 0)
            .unwrap_or(false);
        [self.kept_path(task), task.output.clone()]
            .into_iter()
            .find_map(|p| match fs::metadata(&p) {
                Ok(m) if m.is_file() && (m.len() > 0 || source_empty) => Some(m.len()),
                _ => None,
            })
    }

    /// Fresh start over a tree that may already hold outputs. A replay of a
    /// completed run whose every task still has its output carries that
    /// run's totals forward; otherwise each existing output is measured and
    /// folded once as its own outcome. Either way those paths are done.
    fn settle_existing(
        &self,
        tasks: &[FileTask],
        previous: Option<LogSummary>,
        state: &mut CheckpointState,
        stats: &mut StatsAggregator,
        log: &mut RotatingLogStore,
    ) {
        if !self.config.trust_existing_output {
            return;
        }
        let existing: Vec<(&FileTask, u64)> = tasks
            .iter()
            .filter_map(|t| self.existing_output(t).map(|n| (t, n)))
            .collect();
        if existing.is_empty() {
            return;
        }
        let replay = previous.filter(|s| {
            s.status == RunStatus::Completed
                && s.total_discovered == tasks.len() as u64
                && existing.len() == tasks.len()
        });
        if let Some(prev) = replay {
            info!(files = tasks.len(), "previous run completed, carrying its totals forward");
            *stats = StatsAggregator::seeded(prev.counters);
            for t in tasks {
                state.mark_existing(&t.relative_path);
            }
            return;
        }
        for (task, result) in &existing {
            let outcome = adopted_outcome(task, *result, &self.config.thresholds);
            stats.apply(&outcome);
            state.mark_existing(&task.relative_path);
            log.append(outcome);
        }
        info!(adopted = existing.len(), "counted outputs already on disk");
    }

    /// Attempt one task. Per-file problems become the outcome; only an
    /// unwritable output tree is returned as an error.
    fn process(&self, task: &FileTask) -> Result<ProcessingOutcome> {
        let mut outcome = ProcessingOutcome {
            relative_path: task.relative_path.clone(),
            original_size: 0,
            result_size: None,
            bucket: Bucket::Error,
            error_kind: None,
            detail: None,
            timestamp: OffsetDateTime::now_utc(),
        };

        let kept = self.kept_path(task);
        let staging = staging_path(&kept);
        let observation = match fs::metadata(&task.source) {
            Err(e) => {
                outcome.detail = Some(format!("unreadable source: {e}"));
                Observation::Failed { original: 0 }
            }
            Ok(m) if m.len() == 0 => Observation::Failed { original: 0 },
            Ok(m) => {
                outcome.original_size = m.len();
                self.run_transformer(task, &staging, m.len(), &mut outcome)?
            }
        };

        let c = classify(observation, &self.config.thresholds);
        outcome.bucket = c.bucket;
        outcome.error_kind = c.error_kind;
        if let Observation::Transformed { result, .. } = observation {
            outcome.result_size = Some(result);
        }

        if c.bucket.kept_output() {
            match fs::rename(&staging, &kept) {
                // a mirrored original from an earlier run is superseded
                Ok(()) if kept != task.output => discard_file(&task.output),
                Ok(()) => {}
                Err(e) => {
                    outcome.bucket = Bucket::Error;
                    outcome.error_kind = Some(ErrorKind::TransformFailure);
                    outcome.result_size = None;
                    outcome.detail = Some(format!("could not move output into place: {e}"));
                }
            }
        }
        if !outcome.bucket.kept_output() {
            discard_file(&staging);
            if kept != task.output {
                discard_file(&kept);
            }
            if self.config.mirror_rejected {
                ensure_parent(&task.output)?;
                if let Err(e) = fs::copy(&task.source, &task.output) {
                    warn!(path = %task.relative_path, error = %e, "could not mirror original");
                }
            }
        }

        match outcome.error_kind {
            Some(kind) if outcome.bucket == Bucket::Error => warn!(
                path = %outcome.relative_path,
                %kind,
                detail = outcome.detail.as_deref().unwrap_or(""),
                "file failed"
            ),
            _ => debug!(
                path = %outcome.relative_path,
                bucket = outcome.bucket.as_str(),
                original = outcome.original_size,
                result = ?outcome.result_size,
                "file processed"
            ),
        }
        Ok(outcome)
    }

    fn run_transformer(
        &self,
        task: &FileTask,
        staging: &Path,
        original: u64,
        outcome: &mut ProcessingOutcome,
    ) -> Result<Observation> {
        ensure_parent(&task.output)?;
        // left behind by a run that died mid-transform
        discard_file(staging);

        let failed = Observation::Failed { original };
        if let Err(f) = self.transformer.transform(&task.source, staging) {
            outcome.detail = Some(f.detail);
            return Ok(failed);
        }
        match fs::metadata(staging) {
            Ok(m) if m.len() > 0 => Ok(Observation::Transformed {
                original,
                result: m.len(),
            }),
            Ok(_) => {
                outcome.detail = Some("transformer produced an empty output".into());
                Ok(failed)
            }
            Err(_) => {
                outcome.detail = Some("transformer left no output".into());
                Ok(failed)
            }
        }
    }

    fn summary(
        &self,
        status: RunStatus,
        tally: &Tally,
        state: &CheckpointState,
        stats: &StatsAggregator,
        started_at: OffsetDateTime,
        clock: &Instant,
    ) -> LogSummary {
        let totals = stats.snapshot();
        let done = state.processed_paths.len() as u64;
        let completion_percentage = if tally.discovered == 0 {
            if status == RunStatus::Completed { 100.0 } else { 0.0 }
        } else {
            (done.min(tally.discovered) as f64 * 100.0) / tally.discovered as f64
        };
        LogSummary {
            status,
            total_discovered: tally.discovered,
            total_processed: done,
            skipped: tally.skipped,
            enumeration_errors: tally.enumeration_errors,
            completion_percentage,
            original_size: format_size(totals.original_bytes),
            final_size: format_size(totals.final_bytes),
            space_saved: format_size(totals.bytes_saved),
            counters: totals,
            session: state.session.clone(),
            execution_start: started_at,
            last_update: OffsetDateTime::now_utc(),
            duration_seconds: clock.elapsed().as_secs_f64(),
        }
    }
}

/// Save checkpoint and log. Both are attempted even if the first fails;
/// either failure ends the run.
fn persist(
    checkpoints: &CheckpointStore,
    state: &mut CheckpointState,
    stats: &StatsAggregator,
    log: &RotatingLogStore,
    summary: &LogSummary,
) -> Result<()> {
    state.counters = stats.snapshot();
    state.updated_at = Some(summary.last_update);
    let saved = checkpoints.save(state);
    let flushed = log.flush(summary);
    for e in [&saved, &flushed].into_iter().filter_map(|r| r.as_ref().err()) {
        error!(error = %e, "durability lost");
    }
    saved?;
    flushed
}

fn ensure_parent(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| ShrinkError::Durability {
            operation: "create output directory",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn discard_file(path: &Path) {
    if let Err(e) = atomic::remove_if_exists(path) {
        warn!(path = %path.display(), error = %e, "could not remove file");
    }
}

fn copy_other_files(others: &[FileTask]) -> u64 {
    let mut copied = 0;
    for task in others {
        let same = match (fs::metadata(&task.source), fs::metadata(&task.output)) {
            (Ok(s), Ok(o)) => s.len() == o.len(),
            _ => false,
        };
        if same {
            continue;
        }
        let result = task
            .output
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::copy(&task.source, &task.output));
        match result {
            Ok(_) => copied += 1,
            Err(e) => warn!(path = %task.relative_path, error = %e, "could not copy file"),
        }
    }
    if copied > 0 {
        info!(copied, "copied non-matching files");
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_appends_suffix_to_full_name() {
        assert_eq!(
            staging_path(Path::new("/out/a/doc.pdf")),
            PathBuf::from("/out/a/doc.pdf.part")
        );
    }

    #[test]
    fn existing_output_counts_when_non_empty_or_as_empty_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let copy = crate::transform::copy::CopyTransformer;
        let driver = BatchDriver::new(RunConfig::for_source(dir.path()), &copy).unwrap();
        let task = FileTask {
            relative_path: "a.pdf".into(),
            source: dir.path().join("a.pdf"),
            output: dir.path().join("out.pdf"),
        };
        fs::write(&task.source, b"abc").unwrap();
        assert_eq!(driver.existing_output(&task), None);
        fs::write(&task.output, b"").unwrap();
        assert_eq!(driver.existing_output(&task), None);
        fs::write(&task.output, b"x").unwrap();
        assert_eq!(driver.existing_output(&task), Some(1));
        fs::write(&task.source, b"").unwrap();
        fs::write(&task.output, b"").unwrap();
        assert_eq!(driver.existing_output(&task), Some(0));
    }

    #[test]
    fn kept_outputs_take_the_transformer_extension() {
        let dir = tempfile::tempdir().unwrap();
        let zstd = crate::transform::zstdc::ZstdTransformer::new(3);
        let driver = BatchDriver::new(RunConfig::for_source(dir.path()), &zstd).unwrap();
        let task = FileTask {
            relative_path: "a.pdf".into(),
            source: dir.path().join("a.pdf"),
            output: dir.path().join("out").join("a.pdf"),
        };
        assert_eq!(driver.kept_path(&task), dir.path().join("out").join("a.pdf.zst"));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(&task.source, b"abcdef").unwrap();
        fs::write(driver.kept_path(&task), b"abc").unwrap();
        assert_eq!(driver.existing_output(&task), Some(3));
    }

    #[test]
    fn adopted_outcome_is_measured_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let task = FileTask {
            relative_path: "a.pdf".into(),
            source: dir.path().join("a.pdf"),
            output: dir.path().join("out.pdf"),
        };
        fs::write(&task.source, vec![0u8; 100]).unwrap();
        let o = adopted_outcome(&task, 50, &Thresholds::default());
        assert_eq!(o.bucket, Bucket::Excellent);
        assert_eq!(o.bytes_saved(), 50);
        let same = adopted_outcome(&task, 100, &Thresholds::default());
        assert_eq!(same.bucket, Bucket::None);
        assert_eq!(same.error_kind, Some(ErrorKind::OutputLarger));
    }

    #[test]
    fn other_files_are_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let task = FileTask {
            relative_path: "n/notes.txt".into(),
            source: dir.path().join("notes.txt"),
            output: dir.path().join("out").join("n").join("notes.txt"),
        };
        fs::write(&task.source, b"hello").unwrap();
        assert_eq!(copy_other_files(std::slice::from_ref(&task)), 1);
        assert_eq!(copy_other_files(std::slice::from_ref(&task)), 0);
        assert_eq!(fs::read(&task.output).unwrap(), b"hello");
    }
}
