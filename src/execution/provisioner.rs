//! Container environment provisioning and in-container execution.
//!
//! Two interchangeable strategies implement [`ContainerRuntime`]:
//!
//! - [`ComposeRuntime`] drives the `docker compose` CLI against a descriptor
//!   file and executes commands in a named service.
//! - [`DirectRuntime`] talks to the Docker Engine API: it builds an image
//!   from a build context, runs a detached container and executes commands
//!   in it by container ID.
//!
//! Neither waits for the environment to become healthy; both return once
//! the engine reports the containers as started.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::DockerError;
use crate::execution::command::{CommandRunner, CommandSpec};
use crate::execution::docker_client::{ContainerConfig, DockerClient};
use crate::pipeline::config::{DockerMode, PipelineConfig};

/// Handle to a started environment, used to address later commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentHandle {
    /// A service of a compose project.
    ComposeService {
        compose_file: PathBuf,
        service: String,
    },
    /// A container started directly from an image.
    Container { id: String },
}

impl std::fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentHandle::ComposeService { service, .. } => write!(f, "service {}", service),
            EnvironmentHandle::Container { id } => write!(f, "container {}", id),
        }
    }
}

/// Output of a command run inside the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Builds and starts the containerized environment and runs commands in it.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds images and starts the environment.
    async fn provision(&self) -> Result<EnvironmentHandle, DockerError>;

    /// Runs `command` inside the started environment.
    ///
    /// # Errors
    ///
    /// Fails if the command exits non-zero; the error carries its stderr.
    async fn exec(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
    ) -> Result<ExecOutput, DockerError>;
}

/// `docker compose` based environment.
pub struct ComposeRuntime {
    runner: Arc<dyn CommandRunner>,
    compose_file: PathBuf,
    service: String,
    env: Vec<(String, String)>,
}

impl ComposeRuntime {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        compose_file: impl Into<PathBuf>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            compose_file: compose_file.into(),
            service: service.into(),
            env: Vec::new(),
        }
    }

    /// Environment variables passed to every compose invocation.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    fn compose(&self) -> CommandSpec {
        CommandSpec::new("docker")
            .arg("compose")
            .arg("-f")
            .path_arg(&self.compose_file)
            .envs(self.env.clone())
    }

    /// The `up` invocation issued by [`ContainerRuntime::provision`].
    pub fn up_command(&self) -> CommandSpec {
        self.compose().args(["up", "--build", "-d"])
    }

    /// The `exec` invocation for `command` in `service`.
    pub fn exec_command(&self, service: &str, command: &[String]) -> CommandSpec {
        self.compose()
            .args(["exec", "-T"])
            .arg(service)
            .args(command.iter().cloned())
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn provision(&self) -> Result<EnvironmentHandle, DockerError> {
        if !self.compose_file.exists() {
            tracing::error!(path = %self.compose_file.display(), "Compose file not found");
            return Err(DockerError::DescriptorMissing {
                path: self.compose_file.clone(),
            });
        }

        info!(compose_file = %self.compose_file.display(), "Running docker compose up");
        self.runner.run(&self.up_command()).await?;

        Ok(EnvironmentHandle::ComposeService {
            compose_file: self.compose_file.clone(),
            service: self.service.clone(),
        })
    }

    async fn exec(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
    ) -> Result<ExecOutput, DockerError> {
        let service = match handle {
            EnvironmentHandle::ComposeService { service, .. } => service.as_str(),
            EnvironmentHandle::Container { id } => {
                return Err(DockerError::RunFailed(format!(
                    "compose runtime cannot address container {id}"
                )))
            }
        };

        info!(service = service, "Executing script inside the container");
        let output = self.runner.run(&self.exec_command(service, command)).await?;
        Ok(ExecOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Engine API based environment: build an image, run one detached container.
pub struct DirectRuntime {
    client: DockerClient,
    build_context: PathBuf,
    dockerfile: String,
    image: String,
    env: Vec<(String, String)>,
}

impl DirectRuntime {
    pub fn new(
        client: DockerClient,
        build_context: impl Into<PathBuf>,
        dockerfile: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            client,
            build_context: build_context.into(),
            dockerfile: dockerfile.into(),
            image: image.into(),
            env: Vec::new(),
        }
    }

    /// Environment variables set in the started container.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl ContainerRuntime for DirectRuntime {
    async fn provision(&self) -> Result<EnvironmentHandle, DockerError> {
        self.client
            .build_image(&self.build_context, &self.dockerfile, &self.image)
            .await?;

        let config = ContainerConfig::new(self.image.clone()).with_env_pairs(&self.env);
        let id = self.client.run_detached(config).await?;
        Ok(EnvironmentHandle::Container { id })
    }

    async fn exec(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
    ) -> Result<ExecOutput, DockerError> {
        let id = match handle {
            EnvironmentHandle::Container { id } => id.as_str(),
            EnvironmentHandle::ComposeService { service, .. } => {
                return Err(DockerError::RunFailed(format!(
                    "direct runtime cannot address compose service {service}"
                )))
            }
        };

        info!(container = id, "Executing script inside the container");
        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        let result = self.client.exec_command(id, &args).await?.into_result()?;
        Ok(ExecOutput {
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

/// Builds the runtime selected by `[docker] MODE`.
///
/// # Errors
///
/// Returns `DockerError::DaemonUnavailable` in direct mode when the daemon
/// cannot be reached.
pub fn runtime_from_config(
    config: &PipelineConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn ContainerRuntime>, DockerError> {
    let env = config.azure.env_vars();
    match config.docker.mode {
        DockerMode::Compose => Ok(Box::new(
            ComposeRuntime::new(
                runner,
                config.docker.compose_file.clone(),
                config.docker.service_name.clone(),
            )
            .with_env(env),
        )),
        DockerMode::Direct => {
            let image = config.docker.image_name.clone().ok_or_else(|| {
                DockerError::BuildFailed("direct mode requires docker.IMAGE_NAME".to_string())
            })?;
            Ok(Box::new(
                DirectRuntime::new(
                    DockerClient::new()?,
                    config.docker.build_context.clone(),
                    config.docker.dockerfile.clone(),
                    image,
                )
                .with_env(env),
            ))
        }
    }
}
