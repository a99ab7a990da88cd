use super::{Backend, BackendError, STDERR_LOG, STDOUT_LOG, SubmissionHandle};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use vmdexp::workflows::manifest::SetRecord;

/// Process groups of running engines, killed as a whole on interruption.
#[derive(Debug, Default)]
pub struct ProcessGroups {
    groups: Mutex<HashSet<i32>>,
}

impl ProcessGroups {
    fn insert(&self, pgid: i32) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.insert(pgid);
        }
    }

    fn remove(&self, pgid: i32) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.remove(&pgid);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.lock().map(|g| g.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends SIGKILL to every registered group.
    pub fn kill_all(&self) {
        let Ok(mut groups) = self.groups.lock() else {
            return;
        };
        for pgid in groups.drain() {
            // SAFETY: killpg only sends a signal; a stale group id yields ESRCH.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                warn!(pgid, "Failed to kill engine process group.");
            }
        }
    }
}

/// Runs sets on this machine with one worker per GPU.
///
/// Worker `k` pins its engines to `gpus[k]` through `CUDA_VISIBLE_DEVICES`
/// and takes the next pending set whenever its engine exits. Each engine
/// runs in its own process group with stdout and stderr redirected into the
/// set directory.
pub struct LocalBackend {
    pub engine: String,
    pub gpus: Vec<usize>,
    pub groups: Arc<ProcessGroups>,
}

impl LocalBackend {
    pub fn new(engine: &str, gpus: Vec<usize>) -> Self {
        Self {
            engine: engine.to_string(),
            gpus,
            groups: Arc::new(ProcessGroups::default()),
        }
    }
}

type Queue = Arc<Mutex<VecDeque<(usize, SetRecord)>>>;

async fn worker(
    gpu: usize,
    engine: String,
    queue: Queue,
    groups: Arc<ProcessGroups>,
) -> Result<Vec<(usize, SubmissionHandle)>, BackendError> {
    let mut done = Vec::new();
    loop {
        let next = queue
            .lock()
            .map_err(|_| BackendError::spawn("set queue is poisoned"))?
            .pop_front();
        let Some((index, set)) = next else {
            return Ok(done);
        };

        let log = |name: &str| {
            File::create(set.directory.join(name))
                .map_err(|e| BackendError::spawn(format!("cannot create {} for {}: {}", name, set.name, e)))
        };
        let mut child = Command::new(&engine)
            .args(&set.engine_options)
            .current_dir(&set.directory)
            .env("CUDA_VISIBLE_DEVICES", gpu.to_string())
            .stdout(log(STDOUT_LOG)?)
            .stderr(log(STDERR_LOG)?)
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::spawn(format!("cannot start {} for {}: {}", engine, set.name, e)))?;

        let pid = child.id().map(|id| id as i32);
        if let Some(pid) = pid {
            groups.insert(pid);
        }
        info!(set = %set.name, gpu, pid, "Engine started.");

        let status = child
            .wait()
            .await
            .map_err(|e| BackendError::spawn(format!("lost engine for {}: {}", set.name, e)))?;
        if let Some(pid) = pid {
            groups.remove(pid);
        }
        if status.success() {
            info!(set = %set.name, gpu, "Engine finished.");
        } else {
            error!(set = %set.name, gpu, status = %status, "Engine exited with an error.");
        }

        done.push((
            index,
            SubmissionHandle {
                set: set.name.clone(),
                id: pid.map(|p| p.to_string()).unwrap_or_default(),
                target: format!("gpu {}", gpu),
                exit_code: status.code(),
            },
        ));
    }
}

async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

impl Backend for LocalBackend {
    #[instrument(skip_all, name = "local_submit", fields(sets = sets.len(), workers = self.gpus.len()))]
    async fn submit(&self, sets: &[SetRecord]) -> Result<Vec<SubmissionHandle>, BackendError> {
        if self.gpus.is_empty() {
            return Err(BackendError::spawn("no GPUs given for local workers"));
        }
        let queue: Queue = Arc::new(Mutex::new(sets.iter().cloned().enumerate().collect()));
        let mut workers = JoinSet::new();
        for &gpu in &self.gpus {
            workers.spawn(worker(gpu, self.engine.clone(), queue.clone(), self.groups.clone()));
        }

        let collect = async {
            let mut handles = Vec::with_capacity(sets.len());
            while let Some(joined) = workers.join_next().await {
                let finished = joined.map_err(|e| BackendError::spawn(format!("worker panicked: {}", e)))??;
                handles.extend(finished);
            }
            Ok::<_, BackendError>(handles)
        };

        let mut handles = tokio::select! {
            result = collect => {
                if result.is_err() {
                    self.groups.kill_all();
                }
                result?
            }
            signal = shutdown_signal() => {
                let name = signal.map_err(|e| BackendError::spawn(format!("cannot install signal handlers: {}", e)))?;
                warn!(signal = name, "Interrupted; killing every running engine.");
                self.groups.kill_all();
                return Err(BackendError::spawn(format!("interrupted by {}", name)));
            }
        };
        handles.sort_by_key(|(index, _)| *index);

        let failed = handles.iter().filter(|(_, h)| h.exit_code != Some(0)).count();
        if failed > 0 {
            warn!(failed, "Some engines exited with an error.");
        }
        Ok(handles.into_iter().map(|(_, h)| h).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::testing::sets;

    #[tokio::test]
    async fn each_worker_pins_its_gpu_and_logs_into_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let sets = sets(dir.path(), 4);
        for set in &sets {
            std::fs::write(set.directory.join("input.json"), "echo \"$CUDA_VISIBLE_DEVICES\"\n").unwrap();
        }
        let backend = LocalBackend::new("sh", vec![3, 5]);

        let handles = backend.submit(&sets).await.unwrap();
        let names: Vec<&str> = handles.iter().map(|h| h.set.as_str()).collect();
        assert_eq!(names, vec!["S_0", "S_1", "S_2", "S_3"]);
        for (set, handle) in sets.iter().zip(&handles) {
            assert_eq!(handle.exit_code, Some(0));
            let gpu = std::fs::read_to_string(set.directory.join(STDOUT_LOG)).unwrap();
            assert_eq!(handle.target, format!("gpu {}", gpu.trim()));
            assert!(["3", "5"].contains(&gpu.trim()));
        }
        assert!(backend.groups.is_empty());
    }

    #[tokio::test]
    async fn failing_engines_do_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let sets = sets(dir.path(), 3);
        std::fs::write(sets[0].directory.join("input.json"), "echo boom >&2; exit 2\n").unwrap();
        std::fs::write(sets[1].directory.join("input.json"), "exit 0\n").unwrap();
        std::fs::write(sets[2].directory.join("input.json"), "exit 0\n").unwrap();

        let handles = LocalBackend::new("sh", vec![0]).submit(&sets).await.unwrap();
        let codes: Vec<Option<i32>> = handles.iter().map(|h| h.exit_code).collect();
        assert_eq!(codes, vec![Some(2), Some(0), Some(0)]);
        let stderr = std::fs::read_to_string(sets[0].directory.join(STDERR_LOG)).unwrap();
        assert_eq!(stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn missing_engine_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let sets = sets(dir.path(), 1);
        let err = LocalBackend::new("/nonexistent/engine", vec![0])
            .submit(&sets)
            .await
            .unwrap_err();
        assert_eq!(err.stage, crate::launch::Stage::Spawn);
    }
}
