//! External tool execution.
//!
//! Every subprocess the harness starts (cargo, git, the solver, the verifier)
//! goes through a [`ToolExecutor`]. [`ProcessExecutor`] runs real processes;
//! tests substitute [`crate::fakes::ScriptedExecutor`].

use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use cpbench_core::{HarnessError, Result};

/// Where a stream of a tool's output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Keep it in memory and return it in [`ToolOutput`].
    #[default]
    Capture,
    /// Stream it into a file, truncating any previous content.
    File(PathBuf),
}

impl OutputSink {
    fn stdio(&self) -> Result<Stdio> {
        match self {
            OutputSink::Capture => Ok(Stdio::piped()),
            OutputSink::File(path) => Ok(Stdio::from(File::create(path)?)),
        }
    }
}

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Short label used in logs, e.g. `solve` or `verify`.
    pub name: String,

    pub program: String,

    pub args: Vec<String>,

    pub current_dir: Option<PathBuf>,

    /// Kill the tool after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    pub stdout: OutputSink,

    pub stderr: OutputSink,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
            stdout: OutputSink::Capture,
            stderr: OutputSink::Capture,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = OutputSink::File(path.into());
        self
    }

    pub fn stderr_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = OutputSink::File(path.into());
        self
    }

    /// Program and arguments joined by spaces, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// How a tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Exited(i32),
    /// Terminated by a signal, no exit code.
    Signalled,
    /// Killed by the harness after its timeout.
    TimedOut,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub status: ToolStatus,

    /// Captured stdout; empty when streamed to a file.
    pub stdout: String,

    /// Captured stderr; empty when streamed to a file.
    pub stderr: String,

    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            status: ToolStatus::Exited(code),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ToolStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Whether the tool exited with code 0.
    pub fn success(&self) -> bool {
        self.status == ToolStatus::Exited(0)
    }

    pub fn timed_out(&self) -> bool {
        self.status == ToolStatus::TimedOut
    }
}

/// Runs external tools.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Executes invocations as real child processes.
///
/// Children are killed when their future is dropped, so cancelling an
/// operation (for example on Ctrl-C) never leaves solver processes behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(invocation.stdout.stdio()?)
            .stderr(invocation.stderr.stdio()?)
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        debug!(tool = %invocation.name, command = %invocation.command_line(), "spawning tool");
        let child = command.spawn().map_err(|source| HarnessError::ToolSpawn {
            program: invocation.program.clone(),
            source,
        })?;

        let output = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(ToolOutput {
                        status: ToolStatus::TimedOut,
                        stdout: String::new(),
                        stderr: String::new(),
                        duration_ms: start.elapsed().as_millis() as u64,
                    })
                }
            },
            None => child.wait_with_output().await?,
        };

        let status = match output.status.code() {
            Some(code) => ToolStatus::Exited(code),
            None => ToolStatus::Signalled,
        };

        Ok(ToolOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
