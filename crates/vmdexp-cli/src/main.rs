mod cli;
mod commands;
mod config;
mod error;
mod launch;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};
use vmdexp::workflows::pool::Pool;

const MANIFEST_SUFFIX: &str = ".manifest";

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// The session log a command writes to when `--log-file` is not given.
fn default_log_file(command: &Commands) -> Option<PathBuf> {
    match command {
        Commands::Compose(args) => {
            let pool = Pool::load(&args.pool).ok()?;
            Some(logging::session_log_path(&args.output.join(&pool.name), &pool.name))
        }
        Commands::Launch(args) => {
            let stem = args.session.file_stem()?.to_str()?;
            let session = stem.strip_suffix(MANIFEST_SUFFIX).unwrap_or(stem);
            let dir = args.session.parent().unwrap_or(std::path::Path::new("."));
            Some(logging::session_log_path(dir, session))
        }
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();
    let log_file = cli.log_file.clone().or_else(|| default_log_file(&cli.command));
    logging::setup_logging(cli.verbose, cli.quiet, log_file)?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("vmdexp v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        info!("Setting Rayon global thread pool to {} threads.", num_threads);
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e)))?;
    }

    let command_result = match cli.command {
        Commands::Compose(args) => {
            info!("Dispatching to 'compose' command.");
            commands::compose::run(args).await
        }
        Commands::Launch(args) => {
            info!("Dispatching to 'launch' command.");
            commands::launch::run(args).await
        }
    };

    match &command_result {
        Ok(_) => {
            info!("Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => error!("Command failed: {}", e),
    }
    command_result
}
