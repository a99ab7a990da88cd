use std::path::{Path, PathBuf};

/// File name of the job script written into each set directory.
pub const JOB_SCRIPT: &str = ".job";

/// A batch job script: scheduler directives followed by shell lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    prefix: &'static str,
    directives: Vec<String>,
    body: Vec<String>,
}

impl JobScript {
    /// `prefix` is the scheduler's directive marker, e.g. `#SBATCH`.
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            directives: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn directive(mut self, directive: impl AsRef<str>) -> Self {
        self.directives.push(directive.as_ref().to_string());
        self
    }

    pub fn line(mut self, line: impl AsRef<str>) -> Self {
        self.body.push(line.as_ref().to_string());
        self
    }

    pub fn optional_line(self, line: Option<&str>) -> Self {
        match line {
            Some(l) if !l.trim().is_empty() => self.line(l),
            _ => self,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\n");
        for d in &self.directives {
            out.push_str(self.prefix);
            out.push(' ');
            out.push_str(d);
            out.push('\n');
        }
        out.push('\n');
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Writes the script as `<dir>/.job` and makes it executable.
    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(JOB_SCRIPT);
        std::fs::write(&path, self.render())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }
}

/// Shell-quotes a path for use in a job script.
pub fn quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}
