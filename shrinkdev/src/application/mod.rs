pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use shrink_core::error::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "shrink_core=debug,shrinkdev=debug"
    } else {
        "shrink_core=info,shrinkdev=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            target,
            cadence,
            history,
            strategy,
            level,
            copy_other_files,
            no_trust_existing,
        } => handlers::handle_run(
            target,
            handlers::RunOverrides {
                cadence,
                history,
                strategy,
                level,
                copy_other_files,
                no_trust_existing,
            },
        ),
        Commands::Status { target } => handlers::handle_status(target),
        Commands::Reset { target } => handlers::handle_reset(target),
    };
    if let Err(e) = &result {
        error!(error = %e, kind = ?e.kind(), "shrinkdev failed");
    }
    result
}
