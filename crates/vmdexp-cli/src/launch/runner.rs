use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// File fed to the command's standard input.
    pub stdin: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn stdin(mut self, file: &Path) -> Self {
        self.stdin = Some(file.to_path_buf());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs scheduler commands (`bsub`, `sbatch`).
///
/// Production code uses [`SystemRunner`]; tests substitute a recording
/// runner that never touches a real scheduler.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = std::io::Result<CommandOutput>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        match &invocation.stdin {
            Some(file) => cmd.stdin(Stdio::from(std::fs::File::open(file)?)),
            None => cmd.stdin(Stdio::null()),
        };
        let output = cmd.output().await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every invocation and answers with a canned reply built from
    /// the 1-based call number.
    pub struct RecordingRunner {
        invocations: Mutex<Vec<Invocation>>,
        reply: fn(usize) -> CommandOutput,
    }

    impl RecordingRunner {
        pub fn new(reply: fn(usize) -> CommandOutput) -> Self {
            Self {
                invocations: Mutex::new(Vec::new()),
                reply,
            }
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.invocations
                .lock()
                .expect("RecordingRunner invocations mutex poisoned")
                .clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
            let mut invocations = self
                .invocations
                .lock()
                .expect("RecordingRunner invocations mutex poisoned");
            invocations.push(invocation.clone());
            Ok((self.reply)(invocations.len()))
        }
    }

    pub fn ok(stdout: String) -> CommandOutput {
        CommandOutput {
            status: Some(0),
            stdout,
            stderr: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_runner_captures_output_and_status() {
        let out = SystemRunner
            .run(&Invocation::new("sh").arg("-c").arg("echo submitted; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "submitted");
        assert_eq!(out.status, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn system_runner_feeds_stdin_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join(".job");
        std::fs::write(&script, "echo from-script\n").unwrap();
        let out = SystemRunner
            .run(&Invocation::new("sh").stdin(&script).current_dir(dir.path()))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "from-script");
    }
}
