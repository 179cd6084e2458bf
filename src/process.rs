//! Process runner for the external `hg` and `git` binaries
//!
//! Every VCS operation in the mirror goes through [`CommandRunner`], which keeps
//! the orchestration testable without real repositories.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::{MirrorError, Result};

/// A single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Accept the output when its exit code is one of `accepted`
    pub fn check(self, invocation: &Invocation, accepted: &[i32]) -> Result<Self> {
        match self.code {
            Some(code) if accepted.contains(&code) => Ok(self),
            code => Err(MirrorError::Process {
                command: invocation.to_string(),
                code,
                stderr: self.stderr.trim().to_string(),
            }),
        }
    }

    /// Accept only a zero exit code
    pub fn ensure_success(self, invocation: &Invocation) -> Result<Self> {
        self.check(invocation, &[0])
    }
}

/// Runs external executables and reports their exit status
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runner backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Running: {}", invocation);

        let mut command = AsyncCommand::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|source| MirrorError::Spawn {
            command: invocation.to_string(),
            source,
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.stdout.trim().is_empty() {
            debug!("{} stdout:\n{}", invocation.program, result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            debug!("{} stderr:\n{}", invocation.program, result.stderr.trim_end());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("hg")
            .arg("--cwd")
            .arg(Path::new("hg/trytond"))
            .args(["pull", "-u"]);

        assert_eq!(invocation.to_string(), "hg --cwd hg/trytond pull -u");
    }

    #[test]
    fn test_check_accepts_listed_codes() {
        let invocation = Invocation::new("hg").arg("push");

        let no_changes = CommandOutput {
            code: Some(1),
            ..Default::default()
        };
        assert!(no_changes.check(&invocation, &[0, 1]).is_ok());

        let failure = CommandOutput {
            code: Some(2),
            stderr: "abort: error\n".to_string(),
            ..Default::default()
        };
        assert_matches!(
            failure.check(&invocation, &[0, 1]),
            Err(MirrorError::Process { code: Some(2), ref stderr, .. }) if stderr == "abort: error"
        );
    }

    #[test]
    fn test_signal_is_never_success() {
        let invocation = Invocation::new("git");
        let killed = CommandOutput::default();
        assert!(!killed.success());
        assert!(killed.ensure_success(&invocation).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_status_and_output() {
        let runner = SystemRunner;
        let invocation = Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);

        let output = runner.run(&invocation).await.expect("sh should start");

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_respects_current_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runner = SystemRunner;
        let invocation = Invocation::new("pwd").current_dir(temp_dir.path());

        let output = runner.run(&invocation).await.unwrap();

        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(temp_dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = SystemRunner;
        let invocation = Invocation::new("hgmirror-definitely-not-installed");

        assert_matches!(
            runner.run(&invocation).await,
            Err(MirrorError::Spawn { .. })
        );
    }
}
