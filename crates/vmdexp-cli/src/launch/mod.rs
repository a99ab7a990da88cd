//! Launcher backends.
//!
//! A backend takes the sets of a session manifest and hands each one to an
//! engine process, either directly on this machine or through a cluster
//! scheduler. Submission errors are fatal; engine failures on individual
//! sets are logged and reported in the returned handles.

pub mod local;
pub mod lsf;
pub mod runner;
pub mod script;
pub mod slurm;

use std::fmt;
use thiserror::Error;
use vmdexp::workflows::manifest::SetRecord;

pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submit,
    Spawn,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Submit => f.write_str("submit"),
            Stage::Spawn => f.write_str("spawn"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Backend failed to {stage}: {detail}")]
pub struct BackendError {
    pub stage: Stage,
    pub detail: String,
}

impl BackendError {
    pub fn submit(detail: impl Into<String>) -> Self {
        Self {
            stage: Stage::Submit,
            detail: detail.into(),
        }
    }

    pub fn spawn(detail: impl Into<String>) -> Self {
        Self {
            stage: Stage::Spawn,
            detail: detail.into(),
        }
    }
}

/// What a backend did with one set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub set: String,
    /// Scheduler job id, or the process id for local runs.
    pub id: String,
    /// Node, partition/node pair or GPU the set was sent to.
    pub target: String,
    /// Engine exit code, known only for local runs.
    pub exit_code: Option<i32>,
}

#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Submits every set, in order, and returns one handle per set.
    async fn submit(&self, sets: &[SetRecord]) -> Result<Vec<SubmissionHandle>, BackendError>;
}

/// The engine command line for a set: `<engine> <engineOptions...>`.
pub fn engine_command(engine: &str, set: &SetRecord) -> String {
    std::iter::once(engine)
        .chain(set.engine_options.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use vmdexp::core::component::ComponentSummary;
    use vmdexp::workflows::manifest::SetRecord;

    pub fn sets(root: &Path, n: usize) -> Vec<SetRecord> {
        (0..n)
            .map(|k| {
                let directory = root.join(format!("S_{}", k));
                std::fs::create_dir_all(&directory).unwrap();
                SetRecord {
                    name: format!("S_{}", k),
                    directory,
                    engine_options: vec!["input.json".into()],
                    summary: ComponentSummary::new(),
                }
            })
            .collect()
    }
}
