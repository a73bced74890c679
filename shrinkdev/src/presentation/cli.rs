use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "shrinkdev: resumable batch compression (alpha)", long_about = None)]
pub struct Cli {
    /// Debug-level diagnostics (RUST_LOG takes precedence when set)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which tree to work on. Flags override values from `--config`.
#[derive(Args, Clone, Debug, Default)]
pub struct Target {
    /// JSON run configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source root to walk
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Mirror root (defaults to <source>/compressed)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Directory for checkpoint.json and log.json
    #[arg(long = "state-dir")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Zstd,
    Copy,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process the tree, resuming from a checkpoint when one exists
    Run {
        #[command(flatten)]
        target: Target,

        /// Persist checkpoint and log every K files
        #[arg(long)]
        cadence: Option<u64>,

        /// Number of recent outcomes kept in the log
        #[arg(long)]
        history: Option<usize>,

        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        /// zstd level (1-22)
        #[arg(long)]
        level: Option<i32>,

        /// Also copy files that do not match the extensions
        #[arg(long)]
        copy_other_files: bool,

        /// Reprocess files even when a mirrored output already exists
        #[arg(long)]
        no_trust_existing: bool,
    },

    /// Show checkpoint and log state without changing anything
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Remove the checkpoint so the next run starts fresh
    Reset {
        #[command(flatten)]
        target: Target,
    },
}
