use super::runner::{CommandRunner, Invocation};
use super::script::{JobScript, quote};
use super::{Backend, BackendError, STDERR_LOG, STDOUT_LOG, SubmissionHandle, engine_command};
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};
use vmdexp::workflows::manifest::SetRecord;

/// One submission target: a partition, optionally pinned to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub partition: String,
    pub node: Option<String>,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{}@{}", self.partition, node),
            None => f.write_str(&self.partition),
        }
    }
}

/// Expands node, partition and filling lists into the ordered slot list
/// that jobs round-robin through.
///
/// A single partition is broadcast to every node; otherwise nodes and
/// partitions pair up one to one. A filling `[a, b, ...]` repeats the
/// slot of node `i` `filling[i]` times.
pub fn expand_slots(partitions: &[String], nodes: &[String], fillings: &[usize]) -> Result<Vec<Slot>, BackendError> {
    if partitions.is_empty() {
        return Err(BackendError::submit("at least one partition is required"));
    }
    if !fillings.is_empty() && fillings.len() != nodes.len() {
        return Err(BackendError::submit(format!(
            "{} filling value(s) given for {} node(s)",
            fillings.len(),
            nodes.len()
        )));
    }

    let pairs: Vec<Slot> = if nodes.is_empty() {
        partitions
            .iter()
            .map(|p| Slot {
                partition: p.clone(),
                node: None,
            })
            .collect()
    } else if partitions.len() == 1 {
        nodes
            .iter()
            .map(|n| Slot {
                partition: partitions[0].clone(),
                node: Some(n.clone()),
            })
            .collect()
    } else if partitions.len() == nodes.len() {
        partitions
            .iter()
            .zip(nodes)
            .map(|(p, n)| Slot {
                partition: p.clone(),
                node: Some(n.clone()),
            })
            .collect()
    } else {
        return Err(BackendError::submit(format!(
            "{} partitions cannot be paired with {} nodes",
            partitions.len(),
            nodes.len()
        )));
    };

    let slots: Vec<Slot> = if fillings.is_empty() {
        pairs
    } else {
        pairs
            .into_iter()
            .zip(fillings)
            .flat_map(|(slot, &n)| std::iter::repeat_n(slot, n))
            .collect()
    };
    if slots.is_empty() {
        return Err(BackendError::submit("fillings leave no submission slot"));
    }
    Ok(slots)
}

/// Extracts the job id from `Submitted batch job <id>`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Submits sets with `sbatch` over an expanded slot list.
pub struct SlurmBackend<R> {
    pub runner: R,
    pub engine: String,
    pub slots: Vec<Slot>,
    pub modules: Vec<String>,
    pub gres: Option<String>,
    pub post_script: Option<String>,
    pub interval: Duration,
}

impl<R: CommandRunner> SlurmBackend<R> {
    fn script(&self, set: &SetRecord, slot: &Slot) -> JobScript {
        let mut script = JobScript::new("#SBATCH")
            .directive(format!("--job-name={}", set.name))
            .directive(format!("--partition={}", slot.partition));
        if let Some(node) = &slot.node {
            script = script.directive(format!("--nodelist={}", node));
        }
        if let Some(gres) = &self.gres {
            script = script.directive(format!("--gres={}", gres));
        }
        script = script
            .directive(format!("--output={}", STDOUT_LOG))
            .directive(format!("--error={}", STDERR_LOG))
            .line(format!("cd {}", quote(&set.directory)));
        if !self.modules.is_empty() {
            script = script.line(format!("module purge; module load {}", self.modules.join(" ")));
        }
        script
            .line(engine_command(&self.engine, set))
            .optional_line(self.post_script.as_deref())
    }
}

impl<R: CommandRunner> Backend for SlurmBackend<R> {
    #[instrument(skip_all, name = "slurm_submit", fields(sets = sets.len(), slots = self.slots.len()))]
    async fn submit(&self, sets: &[SetRecord]) -> Result<Vec<SubmissionHandle>, BackendError> {
        if self.slots.is_empty() {
            return Err(BackendError::submit("no submission slots"));
        }
        let mut handles = Vec::with_capacity(sets.len());
        for (k, set) in sets.iter().enumerate() {
            if k > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
            let slot = &self.slots[k % self.slots.len()];
            let path = self
                .script(set, slot)
                .write(&set.directory)
                .map_err(|e| BackendError::submit(format!("cannot write job script for {}: {}", set.name, e)))?;

            let output = self
                .runner
                .run(
                    &Invocation::new("sbatch")
                        .arg(path.display().to_string())
                        .current_dir(&set.directory),
                )
                .await
                .map_err(|e| BackendError::submit(format!("sbatch for {}: {}", set.name, e)))?;
            if !output.success() {
                return Err(BackendError::submit(format!(
                    "sbatch rejected {}: {}",
                    set.name,
                    output.stderr.trim()
                )));
            }
            let id = parse_job_id(&output.stdout).ok_or_else(|| {
                BackendError::submit(format!("unexpected sbatch output for {}: {}", set.name, output.stdout.trim()))
            })?;
            info!(set = %set.name, slot = %slot, job = %id, "Set submitted.");
            handles.push(SubmissionHandle {
                set: set.name.clone(),
                id,
                target: slot.to_string(),
                exit_code: None,
            });
        }
        Ok(handles)
    }
}
