use std::io;
use std::process::Stdio;

use tokio::process::Command;

pub const DEFAULT_SHELL_PROGRAM: &str = "sh";

/// Captured standard streams of one finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Both streams as one block, labeled stderr first.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        if !self.stderr.is_empty() {
            text.push_str("STDERR:\n");
            text.push_str(&self.stderr);
        }
        text.push_str(&self.stdout);
        text
    }
}

/// Spawns shell commands out of process.
pub trait ProcessRunner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or waited on.
    fn run_shell(&self, command: &str) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// Runs `<program> -c <command>` via `tokio::process`.
///
/// The child is killed if the waiting future is dropped, so a cancelled
/// command does not outlive its invocation.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    program: String,
}

impl TokioProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL_PROGRAM)
    }
}

impl ProcessRunner for TokioProcessRunner {
    async fn run_shell(&self, command: &str) -> io::Result<ProcessOutput> {
        let output = Command::new(&self.program)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        tracing::debug!(status = %output.status, "shell command finished");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs one operator command and hands back its streams.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor<R> {
    runner: R,
}

impl<R: ProcessRunner> ShellExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or waited on.
    pub async fn run(&self, command: &str) -> io::Result<ProcessOutput> {
        self.runner.run_shell(command).await
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}
