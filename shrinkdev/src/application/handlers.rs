use shrink_core::checkpoint::{CheckpointStore, Loaded};
use shrink_core::error::{Result, ShrinkError};
use shrink_core::log::read_log;
use shrink_core::{BatchDriver, RunConfig, TransformerConfig, format_size};
use tracing::{info, warn};

use crate::presentation::cli::{Strategy, Target};

/// Run-only flags layered over the resolved configuration.
#[derive(Clone, Debug, Default)]
pub struct RunOverrides {
    pub cadence: Option<u64>,
    pub history: Option<usize>,
    pub strategy: Option<Strategy>,
    pub level: Option<i32>,
    pub copy_other_files: bool,
    pub no_trust_existing: bool,
}

fn resolve_config(target: Target) -> Result<RunConfig> {
    let mut cfg = match &target.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(source) = target.source {
        cfg.source_root = source;
    }
    if let Some(output) = target.output {
        cfg.output_root = Some(output);
    }
    if let Some(state_dir) = target.state_dir {
        cfg.state_dir = Some(state_dir);
    }
    if cfg.source_root.as_os_str().is_empty() {
        return Err(ShrinkError::Config(
            "either --config or --source is required".into(),
        ));
    }
    cfg.validate()?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut RunConfig, o: &RunOverrides) -> Result<()> {
    if let Some(k) = o.cadence {
        cfg.checkpoint_every = k;
    }
    if let Some(n) = o.history {
        cfg.history_capacity = n;
    }
    let current_level = match cfg.transformer {
        TransformerConfig::Zstd { level } => Some(level),
        _ => None,
    };
    match (o.strategy, o.level) {
        (Some(Strategy::Copy), level) => {
            if level.is_some() {
                warn!("--level has no effect with the copy strategy");
            }
            cfg.transformer = TransformerConfig::Copy;
        }
        (Some(Strategy::Zstd), level) => {
            let default = match TransformerConfig::default() {
                TransformerConfig::Zstd { level } => level,
                _ => 19,
            };
            cfg.transformer = TransformerConfig::Zstd {
                level: level.or(current_level).unwrap_or(default),
            };
        }
        (None, Some(level)) => match &mut cfg.transformer {
            TransformerConfig::Zstd { level: l } => *l = level,
            _ => warn!("--level only applies to the zstd strategy"),
        },
        (None, None) => {}
    }
    if o.copy_other_files {
        cfg.copy_other_files = true;
    }
    if o.no_trust_existing {
        cfg.trust_existing_output = false;
    }
    cfg.validate()
}

pub fn handle_run(target: Target, overrides: RunOverrides) -> Result<()> {
    let mut cfg = resolve_config(target)?;
    apply_overrides(&mut cfg, &overrides)?;
    let transformer = cfg.transformer.build();
    let driver = BatchDriver::new(cfg, transformer.as_ref())?;
    let report = driver.run()?;
    println!("{report}");
    Ok(())
}

pub fn handle_status(target: Target) -> Result<()> {
    let cfg = resolve_config(target)?;
    let store = CheckpointStore::new(cfg.checkpoint_path());
    match store.load() {
        Loaded::Missing => println!("checkpoint: none ({})", store.path().display()),
        Loaded::Discarded(reason) => println!("checkpoint: unusable, next run starts fresh ({reason})"),
        Loaded::Resumed(state) => {
            println!("checkpoint: {}", store.path().display());
            println!("  processed files:   {}", state.processed_paths.len());
            println!("  update sequence:   {}", state.last_update_sequence);
            println!("  resume count:      {}", state.session.resume_count);
            if let Some(t) = state.updated_at {
                println!("  last saved:        {t}");
            }
        }
    }

    let log = read_log(&cfg.log_path());
    match log.summary {
        None => println!("log: none ({})", cfg.log_path().display()),
        Some(s) => {
            println!("log: {}", cfg.log_path().display());
            println!("  status:            {:?}", s.status);
            println!(
                "  progress:          {}/{} ({:.1}%)",
                s.total_processed, s.total_discovered, s.completion_percentage
            );
            println!("  attempted:         {}", s.counters.attempted);
            println!(
                "  space saved:       {} of {}",
                format_size(s.counters.bytes_saved),
                format_size(s.counters.original_bytes)
            );
            println!("  recent outcomes:   {}", log.history.len());
        }
    }
    Ok(())
}

pub fn handle_reset(target: Target) -> Result<()> {
    let cfg = resolve_config(target)?;
    let store = CheckpointStore::new(cfg.checkpoint_path());
    let existed = store.exists();
    store.clear()?;
    if existed {
        info!(path = %store.path().display(), "checkpoint removed");
    }
    eprintln!("reset: OK");
    Ok(())
}
