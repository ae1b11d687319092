//! Error types for dreamweaver operations.
//!
//! Defines error types for every pipeline subsystem:
//! - External command execution (git, pip, docker compose)
//! - Repository setup and synchronisation
//! - Container provisioning and in-container execution
//! - Chat-completion API calls and artifact persistence
//!
//! None of these are recovered from locally. They bubble up to the
//! orchestrator, which aborts the run on the first one.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::config::ConfigError;

/// Errors raised when running an external command on the host.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command `{command}` exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Blocking worker failed: {0}")]
    Join(String),
}

impl CommandError {
    /// Captured stderr of the failed command, if it ran at all.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Errors that can occur while preparing or syncing the local fork.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Directory not found: {}", path.display())]
    EnvironmentMissing { path: PathBuf },

    #[error("Dependency manifest not found: {}", path.display())]
    MissingManifest { path: PathBuf },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Compose file not found at {}", path.display())]
    DescriptorMissing { path: PathBuf },

    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Container exited with non-zero code {code}: {stderr}")]
    NonZeroExit { code: i64, stderr: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while calling the completion API.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Generation task did not complete: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Command(#[from] CommandError),
}
