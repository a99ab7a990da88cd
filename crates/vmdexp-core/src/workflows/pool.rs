use super::packer::PackerMode;
use crate::core::component::SimulationDescription;
use crate::core::registry::Registry;
use crate::engine::composer::{ComposedSimulation, Composer};
use crate::engine::error::ComposeError;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to read pool file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON pool file '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse TOML pool file '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported pool file format '{0}' (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("Simulation name '{0}' appears more than once in the pool")]
    DuplicateSimulation(String),

    #[error("Simulation '{simulation}' failed: {source}")]
    Compose {
        simulation: String,
        #[source]
        source: ComposeError,
    },

    #[error("Simulation '{simulation}' was left out with its set '{set}': {reason}")]
    SetRejected {
        simulation: String,
        set: String,
        reason: String,
    },
}

/// An ordered list of simulation descriptions sharing one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    #[serde(default)]
    pub packer: PackerMode,
    pub simulations: Vec<SimulationDescription>,
}

impl Pool {
    pub fn new(name: &str, packer: PackerMode) -> Self {
        Self {
            name: name.to_string(),
            packer,
            simulations: Vec::new(),
        }
    }

    pub fn with(mut self, simulation: SimulationDescription) -> Self {
        self.simulations.push(simulation);
        self
    }

    /// Loads a pool from a `.json` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let io = |source| PoolError::Io {
            path: path.to_path_buf(),
            source,
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let file = std::fs::File::open(path).map_err(io)?;
                serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| PoolError::Json {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Some("toml") => {
                let content = std::fs::read_to_string(path).map_err(io)?;
                toml::from_str(&content).map_err(|source| PoolError::Toml {
                    path: path.to_path_buf(),
                    source,
                })
            }
            _ => Err(PoolError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// A simulation that could not be composed, with its pool position.
#[derive(Debug)]
pub struct PoolFailure {
    pub index: usize,
    pub simulation: String,
    pub error: PoolError,
}

/// The result of composing a pool: successes in pool order, then failures.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub composed: Vec<ComposedSimulation>,
    pub failures: Vec<PoolFailure>,
}

impl PoolOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Composes every simulation of the pool, best effort.
///
/// A failing simulation is logged and recorded; its siblings are composed
/// regardless. A repeated simulation name fails the later occurrence.
#[instrument(skip_all, name = "pool_composition", fields(pool = %pool.name))]
pub fn compose_pool(pool: &Pool, registry: &Registry, reporter: &ProgressReporter) -> PoolOutcome {
    info!(simulations = pool.simulations.len(), "Composing simulation pool.");
    reporter.report(Progress::PhaseStart { name: "Composition" });
    reporter.report(Progress::TaskStart {
        total_steps: pool.simulations.len() as u64,
    });

    let mut seen = HashSet::new();
    let duplicates: Vec<bool> = pool
        .simulations
        .iter()
        .map(|d| d.simulation_name().is_some_and(|name| !seen.insert(name)))
        .collect();

    let composer = Composer::new(registry);
    let compose_one = |(index, desc): (usize, &SimulationDescription)| {
        let name = desc.simulation_name().unwrap_or_default().to_string();
        let result = if duplicates[index] {
            Err(PoolError::DuplicateSimulation(name.clone()))
        } else {
            composer.compose(desc).map_err(|source| PoolError::Compose {
                simulation: name.clone(),
                source,
            })
        };
        reporter.report(Progress::TaskIncrement);
        (index, name, result)
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = pool.simulations.iter().enumerate().map(compose_one).collect();

    #[cfg(feature = "parallel")]
    let results: Vec<_> = pool.simulations.par_iter().enumerate().map(compose_one).collect();

    reporter.report(Progress::TaskFinish);

    let mut outcome = PoolOutcome::default();
    for (index, simulation, result) in results {
        match result {
            Ok(composed) => outcome.composed.push(composed),
            Err(e) => {
                error!(simulation = %simulation, "{}", e);
                reporter.report(Progress::SimulationFailed {
                    name: simulation.clone(),
                    reason: e.to_string(),
                });
                outcome.failures.push(PoolFailure {
                    index,
                    simulation,
                    error: e,
                });
            }
        }
    }
    reporter.report(Progress::PhaseFinish);

    info!(
        composed = outcome.composed.len(),
        failed = outcome.failures.len(),
        "Pool composition finished."
    );
    outcome
}
