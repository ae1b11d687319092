//! dreamweaver: fork synchronisation, container provisioning and
//! concurrent LLM artifact generation.
//!
//! The pipeline keeps a local fork rebased on its upstream, brings up the
//! project's container environment, requests N chat completions at once and
//! stores each response as `prompt<index>.json`, then runs a
//! post-processing script inside the environment.

pub mod cli;
pub mod error;
pub mod execution;
pub mod llm;
pub mod pipeline;
pub mod repo;

// Re-export commonly used error types
pub use error::{CommandError, DockerError, LlmError, PipelineError, RepoError};
pub use pipeline::ConfigError;
