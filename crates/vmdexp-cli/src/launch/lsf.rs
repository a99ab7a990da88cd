use super::runner::{CommandRunner, Invocation};
use super::script::{JobScript, quote};
use super::{Backend, BackendError, STDERR_LOG, STDOUT_LOG, SubmissionHandle, engine_command};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};
use vmdexp::workflows::manifest::SetRecord;

/// Submits sets with `bsub`, round-robin over a node list.
///
/// Each job copies its set directory to `<scratch>/<user>/<session>/<set>`,
/// runs the engine there and copies the results back.
pub struct LsfBackend<R> {
    pub runner: R,
    pub engine: String,
    pub session: String,
    pub nodes: Vec<String>,
    pub queue: Option<String>,
    pub scratch_root: PathBuf,
    pub user: String,
    pub post_script: Option<String>,
    pub interval: Duration,
}

impl<R: CommandRunner> LsfBackend<R> {
    fn scratch_dir(&self, set: &SetRecord) -> PathBuf {
        self.scratch_root.join(&self.user).join(&self.session).join(&set.name)
    }

    fn script(&self, set: &SetRecord, node: &str) -> JobScript {
        let set_dir = quote(&set.directory);
        let scratch = quote(&self.scratch_dir(set));
        let mut script = JobScript::new("#BSUB")
            .directive(format!("-J {}", set.name))
            .directive(format!("-m {}", node));
        if let Some(queue) = &self.queue {
            script = script.directive(format!("-q {}", queue));
        }
        script
            .directive(format!("-o {}", quote(&set.directory.join(STDOUT_LOG))))
            .directive(format!("-e {}", quote(&set.directory.join(STDERR_LOG))))
            .line(format!("mkdir -p {}", scratch))
            .line(format!("cp -r {}/. {}", set_dir, scratch))
            .line(format!("cd {}", scratch))
            .line(engine_command(&self.engine, set))
            .line(format!("cp -r {}/. {}", scratch, set_dir))
            .optional_line(self.post_script.as_deref())
    }
}

/// Extracts `<id>` from `Job <id> is submitted to queue <q>.`
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let start = stdout.find("Job <")? + "Job <".len();
    let end = stdout[start..].find('>')? + start;
    let id = &stdout[start..end];
    (!id.is_empty()).then(|| id.to_string())
}

impl<R: CommandRunner> Backend for LsfBackend<R> {
    #[instrument(skip_all, name = "lsf_submit", fields(sets = sets.len()))]
    async fn submit(&self, sets: &[SetRecord]) -> Result<Vec<SubmissionHandle>, BackendError> {
        if self.nodes.is_empty() {
            return Err(BackendError::submit("no nodes to submit to"));
        }
        let mut handles = Vec::with_capacity(sets.len());
        for (k, set) in sets.iter().enumerate() {
            if k > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
            let node = &self.nodes[k % self.nodes.len()];
            let path = self
                .script(set, node)
                .write(&set.directory)
                .map_err(|e| BackendError::submit(format!("cannot write job script for {}: {}", set.name, e)))?;

            let output = self
                .runner
                .run(&Invocation::new("bsub").stdin(&path).current_dir(&set.directory))
                .await
                .map_err(|e| BackendError::submit(format!("bsub for {}: {}", set.name, e)))?;
            if !output.success() {
                return Err(BackendError::submit(format!(
                    "bsub rejected {}: {}",
                    set.name,
                    output.stderr.trim()
                )));
            }
            let id = parse_job_id(&output.stdout).ok_or_else(|| {
                BackendError::submit(format!("unexpected bsub output for {}: {}", set.name, output.stdout.trim()))
            })?;
            info!(set = %set.name, node = %node, job = %id, "Set submitted.");
            handles.push(SubmissionHandle {
                set: set.name.clone(),
                id,
                target: node.clone(),
                exit_code: None,
            });
        }
        Ok(handles)
    }
}
