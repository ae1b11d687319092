//! Host command execution.
//!
//! Every external tool (git, pip, docker compose) is invoked through the
//! [`CommandRunner`] trait. The production runner executes the blocking
//! `std::process::Command` on tokio's blocking pool so the current-thread
//! scheduler stays responsive while the child runs.

use std::fmt;
use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::CommandError;

/// A single command invocation: program, arguments and child environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (looked up on `PATH`).
    pub program: String,
    /// Arguments, passed verbatim without shell interpretation.
    pub args: Vec<String>,
    /// Extra environment variables for the child only.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a new invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Adds environment variables visible to the child only.
    pub fn envs(mut self, vars: Vec<(String, String)>) -> Self {
        self.envs.extend(vars);
        self
    }

    /// Returns true if any argument equals `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    /// Renders the command line. Environment values are never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; -1 if the child was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Converts a non-zero exit into `CommandError::NonZeroExit`.
    pub fn into_result(self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::NonZeroExit {
                command: spec.to_string(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs host commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::NonZeroExit` (with captured stderr) when the
    /// command fails and `CommandError::Spawn` when it cannot be started.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the host, offloaded to the blocking thread pool.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

fn run_blocking(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    for (key, value) in &spec.envs {
        command.env(key, value);
    }

    let output = command.output().map_err(|source| CommandError::Spawn {
        command: spec.to_string(),
        source,
    })?;

    Ok(CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %spec, "Running command");

        let owned = spec.clone();
        let output = tokio::task::spawn_blocking(move || run_blocking(&owned))
            .await
            .map_err(|e| CommandError::Join(e.to_string()))??;

        if !output.stdout.trim().is_empty() {
            info!(command = %spec, "{}", output.stdout.trim_end());
        }
        if !output.success() {
            error!(command = %spec, code = output.code, "Command failed: {}", output.stderr.trim_end());
        } else if !output.stderr.trim().is_empty() {
            // git and docker report progress on stderr
            debug!(command = %spec, "{}", output.stderr.trim_end());
        }

        output.into_result(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .path_arg(Path::new("/srv/fork"))
            .args(["push", "origin", "main"])
            .envs(vec![("A".to_string(), "1".to_string())]);

        assert_eq!(spec.program, "git");
        assert_eq!(spec.args, vec!["-C", "/srv/fork", "push", "origin", "main"]);
        assert_eq!(spec.envs.len(), 1);
        assert!(spec.has_arg("push"));
        assert!(!spec.has_arg("fetch"));
    }

    #[test]
    fn test_display_omits_env_values() {
        let spec = CommandSpec::new("docker")
            .args(["compose", "up"])
            .envs(vec![("AZURE_API_KEY".to_string(), "secret".to_string())]);
        let rendered = spec.to_string();
        assert_eq!(rendered, "docker compose up");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_into_result_maps_failure() {
        let spec = CommandSpec::new("git").arg("fetch");
        let output = CommandOutput {
            code: 128,
            stdout: String::new(),
            stderr: "fatal: unable to access".to_string(),
        };
        let err = output.into_result(&spec).unwrap_err();
        match err {
            CommandError::NonZeroExit {
                command,
                code,
                stderr,
            } => {
                assert_eq!(command, "git fetch");
                assert_eq!(code, 128);
                assert_eq!(stderr, "fatal: unable to access");
            }
            other => panic!("Expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);
        let output = runner.run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_system_runner_reports_stderr_on_failure() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = runner.run(&spec).await.unwrap_err();
        assert_eq!(err.stderr().map(str::trim), Some("boom"));
        assert!(matches!(err, CommandError::NonZeroExit { code: 3, .. }));
    }

    #[tokio::test]
    async fn test_system_runner_passes_env_to_child_only() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf %s \"$DW_TEST_VALUE\""])
            .envs(vec![("DW_TEST_VALUE".to_string(), "scoped".to_string())]);
        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stdout, "scoped");
        assert!(std::env::var("DW_TEST_VALUE").is_err());
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("definitely-not-a-real-binary-dw");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
