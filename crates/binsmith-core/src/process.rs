//! External process execution.
//!
//! Every toolchain invocation (npm, esbuild, pkg, pip, Nuitka) goes through
//! the [`CommandRunner`] trait so the pipeline can be driven by deterministic
//! fakes in tests. [`TokioCommandRunner`] is the real implementation: it
//! spawns the process on the Tokio reactor, captures both output streams and
//! kills the child if the per-step timeout elapses.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Number of trailing output lines carried into error messages.
pub const ERROR_TAIL_LINES: usize = 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
}

/// A fully described process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether any argument equals `needle`. Handy for matching in fakes.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result (exit code 1) with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Last `n` lines of diagnostic output, preferring stderr.
    pub fn tail(&self, n: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }

    /// One-line failure summary: exit code plus the output tail.
    pub fn failure_summary(&self) -> String {
        let tail = self.tail(ERROR_TAIL_LINES);
        match (self.code, tail.is_empty()) {
            (Some(code), true) => format!("exit code {code}"),
            (Some(code), false) => format!("exit code {code}: {tail}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {tail}"),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run `spec` to completion.
    ///
    /// A non-zero exit is *not* an error here; it is reported through
    /// [`CommandOutput::success`] so callers can map it to their own
    /// failure kinds.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// Runs processes on the Tokio reactor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        debug!(command = %spec, cwd = ?spec.cwd, "spawning process");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            // Dropping the output future (timeout) must not leak the child.
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let spawn_err = |e: std::io::Error| ProcessError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        };

        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    program: spec.program.clone(),
                    secs: limit.as_secs(),
                })?
                .map_err(spawn_err)?,
            None => command.output().await.map_err(spawn_err)?,
        };

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success {
            debug!(command = %spec, code = ?result.code, stderr = %result.tail(5), "process failed");
        }

        Ok(result)
    }
}
