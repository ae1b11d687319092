//! Pipeline orchestration.
//!
//! # Pipeline Flow
//!
//! 1. **Setup**: clone the fork if absent, install its dependency manifest
//! 2. **Sync**: fetch upstream, rebase, push to `origin`
//! 3. **Provision**: build and start the container environment
//! 4. **Generate**: request N completions concurrently, persist each response
//! 5. **Exec**: run the post-processing command inside the environment
//!
//! Stages run strictly in order; the first failure aborts the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dreamweaver::execution::SystemCommandRunner;
//! use dreamweaver::pipeline::{Pipeline, PipelineConfig};
//!
//! let config = Arc::new(PipelineConfig::load("dreamweaver.toml".as_ref())?);
//! let pipeline = Pipeline::from_config(config, Arc::new(SystemCommandRunner::new()))?;
//! let report = pipeline.run().await?;
//! println!("{} artifacts written", report.artifacts.len());
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{
    AzureCredentials, ConfigError, DockerMode, DockerSettings, GeneratorSettings, GitSettings,
    PipelineConfig, SetupSettings,
};
pub use orchestrator::{Pipeline, RunReport, Stage};
