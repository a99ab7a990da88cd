use super::manifest::SessionManifest;
use super::materialize::{MaterializationError, Materializer};
use super::packer::{PackError, pack};
use super::pool::{Pool, PoolError, PoolFailure, compose_pool};
use crate::core::registry::Registry;
use crate::engine::progress::{Progress, ProgressReporter};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Materialization(#[from] MaterializationError),
}

/// A materialized session and the simulations left out of it.
#[derive(Debug)]
pub struct SessionOutcome {
    pub manifest: SessionManifest,
    pub failures: Vec<PoolFailure>,
}

/// Composes, packs and materializes a whole pool.
///
/// Simulations that fail to compose are excluded from packing, and sets
/// that cannot be merged are left out of the session. Everything else is
/// still written; the failures are returned so the caller can fail the run.
#[instrument(skip_all, name = "session_workflow", fields(session = %pool.name))]
pub fn run(
    pool: &Pool,
    registry: &Registry,
    materializer: &Materializer,
    reporter: &ProgressReporter,
) -> Result<SessionOutcome, SessionError> {
    let outcome = compose_pool(pool, registry, reporter);

    let plans = reporter.phase("Packing", || pack(&pool.packer, &pool.name, &outcome.composed))?;
    info!(sets = plans.len(), "Pool packed into simulation sets.");

    let written = reporter.phase("Materialization", || {
        materializer.materialize(&pool.name, &outcome.composed, &plans)
    })?;

    let mut failures = outcome.failures;
    for set in &written.rejected {
        for simulation in &set.members {
            let error = PoolError::SetRejected {
                simulation: simulation.clone(),
                set: set.name.clone(),
                reason: set.error.to_string(),
            };
            error!(simulation = %simulation, "{}", error);
            reporter.report(Progress::SimulationFailed {
                name: simulation.clone(),
                reason: error.to_string(),
            });
            failures.push(PoolFailure {
                index: pool_index(pool, simulation),
                simulation: simulation.clone(),
                error,
            });
        }
    }
    failures.sort_by_key(|f| f.index);

    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            "Session written without the simulations that failed to compose or merge."
        );
    }
    Ok(SessionOutcome {
        manifest: written.manifest,
        failures,
    })
}

fn pool_index(pool: &Pool, simulation: &str) -> usize {
    pool.simulations
        .iter()
        .position(|d| d.simulation_name() == Some(simulation))
        .unwrap_or(pool.simulations.len())
}
