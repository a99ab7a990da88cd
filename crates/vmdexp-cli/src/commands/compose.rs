use crate::cli::ComposeArgs;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use tracing::{error, info};
use vmdexp::core::registry::Registry;
use vmdexp::engine::progress::ProgressReporter;
use vmdexp::workflows::materialize::Materializer;
use vmdexp::workflows::pool::Pool;
use vmdexp::workflows::session;

pub async fn run(args: ComposeArgs) -> Result<()> {
    info!("Loading simulation pool from {:?}", &args.pool);
    let pool = Pool::load(&args.pool)?;
    let registry = Registry::with_builtins()?;
    info!(
        classes = registry.len(),
        simulations = pool.simulations.len(),
        "Component registry ready."
    );

    let materializer = Materializer::new(&args.output, args.overwrite);
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Composing session '{}'...", pool.name);
    let outcome =
        tokio::task::block_in_place(|| session::run(&pool, &registry, &materializer, &reporter))?;

    let manifest = &outcome.manifest;
    println!(
        "✓ {} simulation(s) in {} set(s); manifest written to {}",
        manifest.simulations.len(),
        manifest.simulation_sets.len(),
        vmdexp::workflows::manifest::SessionManifest::path_for(materializer.root(), &manifest.name).display()
    );

    if !outcome.failures.is_empty() {
        for failure in &outcome.failures {
            error!(simulation = %failure.simulation, index = failure.index, "{}", failure.error);
        }
        return Err(CliError::SimulationsFailed {
            failed: outcome.failures.len(),
        });
    }
    Ok(())
}
