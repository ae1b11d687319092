//! Pipeline orchestrator.
//!
//! Runs the stages strictly in order: setup, sync, provision, generate,
//! exec. Each stage completes before the next starts and the first error
//! aborts the run. Every stage is also callable on its own for the
//! single-stage CLI commands.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::error::PipelineError;
use crate::execution::command::CommandRunner;
use crate::execution::provisioner::{runtime_from_config, ContainerRuntime, EnvironmentHandle};
use crate::llm::generator::{Artifact, ArtifactGenerator};
use crate::repo::RepoSync;

use super::config::PipelineConfig;

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Sync,
    Provision,
    Generate,
    Exec,
}

impl Stage {
    /// All stages in the order a full run executes them.
    pub const ALL: [Stage; 5] = [
        Stage::Setup,
        Stage::Sync,
        Stage::Provision,
        Stage::Generate,
        Stage::Exec,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Setup => write!(f, "setup"),
            Stage::Sync => write!(f, "sync"),
            Stage::Provision => write!(f, "provision"),
            Stage::Generate => write!(f, "generate"),
            Stage::Exec => write!(f, "exec"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub environment: EnvironmentHandle,
    pub artifacts: Vec<Artifact>,
    pub exec_stdout: String,
}

/// Coordinates the five pipeline stages.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    repo: RepoSync,
    runtime: Box<dyn ContainerRuntime>,
    generator: ArtifactGenerator,
}

impl Pipeline {
    /// Assembles a pipeline from explicit parts.
    pub fn new(
        config: Arc<PipelineConfig>,
        runner: Arc<dyn CommandRunner>,
        runtime: Box<dyn ContainerRuntime>,
        generator: ArtifactGenerator,
    ) -> Self {
        let repo = RepoSync::new(runner, Arc::clone(&config));
        Self {
            config,
            repo,
            runtime,
            generator,
        }
    }

    /// Assembles a pipeline with the runtime and generator the config selects.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, PipelineError> {
        let runtime = runtime_from_config(&config, Arc::clone(&runner))?;
        let generator = ArtifactGenerator::from_config(&config)?;
        Ok(Self::new(config, runner, runtime, generator))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 0: clone if absent and install dependencies.
    pub async fn setup(&self) -> Result<(), PipelineError> {
        staged(Stage::Setup, self.repo.setup()).await?;
        Ok(())
    }

    /// Stage 1: fetch, rebase and push.
    pub async fn sync(&self) -> Result<(), PipelineError> {
        staged(Stage::Sync, self.repo.sync()).await?;
        Ok(())
    }

    /// Stage 2: build and start the container environment.
    pub async fn provision(&self) -> Result<EnvironmentHandle, PipelineError> {
        Ok(staged(Stage::Provision, self.runtime.provision()).await?)
    }

    /// Stage 3: fan out completion requests and persist the responses.
    pub async fn generate(&self) -> Result<Vec<Artifact>, PipelineError> {
        Ok(staged(Stage::Generate, self.generator.generate()).await?)
    }

    /// Stage 4: run the post-processing command in the environment.
    pub async fn exec(&self, handle: &EnvironmentHandle) -> Result<String, PipelineError> {
        let command = &self.config.docker.exec_command;
        let output = staged(Stage::Exec, self.runtime.exec(handle, command)).await?;
        Ok(output.stdout)
    }

    /// Runs every stage in order, stopping at the first failure.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started = Instant::now();

        self.setup().await?;
        self.sync().await?;
        let environment = self.provision().await?;
        let artifacts = self.generate().await?;
        let exec_stdout = self.exec(&environment).await?;

        info!(
            artifacts = artifacts.len(),
            environment = %environment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline completed"
        );

        Ok(RunReport {
            environment,
            artifacts,
            exec_stdout,
        })
    }
}

async fn staged<T, E, F>(stage: Stage, fut: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    info!(stage = %stage, "Stage started");
    let started = Instant::now();
    match fut.await {
        Ok(value) => {
            info!(
                stage = %stage,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage finished"
            );
            Ok(value)
        }
        Err(e) => {
            error!(stage = %stage, error = %e, "Stage failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<String> = Stage::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["setup", "sync", "provision", "generate", "exec"]);
    }

    #[tokio::test]
    async fn test_staged_passes_through_results() {
        let ok: Result<u8, String> = staged(Stage::Sync, async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, String> = staged(Stage::Sync, async { Err("boom".to_string()) }).await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
