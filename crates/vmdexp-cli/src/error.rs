use crate::launch::BackendError;
use std::path::PathBuf;
use thiserror::Error;
use vmdexp::core::registry::RegistryError;
use vmdexp::workflows::manifest::ManifestError;
use vmdexp::workflows::pool::PoolError;
use vmdexp::workflows::session::SessionError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{failed} simulation(s) failed to compose; see the session log")]
    SimulationsFailed { failed: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
