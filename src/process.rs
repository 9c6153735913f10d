//! Running host tools.
//!
//! Every external program the build needs (uname, depmod, gzip, busybox,
//! hostid, and the `find | cpio | gzip` pipeline) is started through
//! [`Cmd`]. A failure names the tool and carries its exit code and stderr.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Captured standard output of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
}

impl ToolOutput {
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// One tool invocation.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            context: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// What the caller was trying to do, used as the error headline.
    pub fn context(mut self, what: impl Into<String>) -> Self {
        self.context = Some(what.into());
        self
    }

    /// Run to completion. A non-zero exit is an error.
    pub fn run(self) -> Result<ToolOutput> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;
        if !output.status.success() {
            return Err(self.failure(&output));
        }
        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn failure(&self, output: &Output) -> anyhow::Error {
        let headline = match &self.context {
            Some(what) => what.clone(),
            None => format!("'{}' failed", self.program),
        };
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "killed by signal".to_string(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        match stderr.trim() {
            "" => anyhow!("{} ({})", headline, status),
            text => anyhow!("{} ({}):\n{}", headline, status, text),
        }
    }
}

/// Run `command` with `sh -c` from inside `dir`.
pub fn shell_in(command: &str, dir: &Path) -> Result<ToolOutput> {
    Cmd::new("sh").arg("-c").arg(command).dir(dir).run()
}

/// Full path of `program` if it is on PATH.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}
