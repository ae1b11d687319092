//! Docker API wrapper using the bollard crate.
//!
//! Covers the calls direct mode needs: building an image from a local
//! build context, running a detached container from it and executing a
//! command inside the running container.

use std::path::{Path, PathBuf};

use bollard::container::{Config, CreateContainerOptions, LogOutput, StartContainerOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::DockerError;

/// Configuration for creating a new container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Docker image to use.
    pub image: String,
    /// Environment variables in `KEY=value` form.
    pub env: Vec<String>,
}

impl ContainerConfig {
    /// Creates a new container configuration for the given image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            env: Vec::new(),
        }
    }

    /// Adds environment variables from key/value pairs.
    pub fn with_env_pairs(mut self, vars: &[(String, String)]) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| format!("{}={}", k, v)));
        self
    }
}

/// Result of executing a command in a container.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Converts a non-zero exit into `DockerError::NonZeroExit`.
    pub fn into_result(self) -> Result<ExecResult, DockerError> {
        if self.exit_code == 0 {
            Ok(self)
        } else {
            Err(DockerError::NonZeroExit {
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Packs a build context directory into an in-memory tar archive.
///
/// Blocking; call it from the blocking pool.
pub fn archive_build_context(context: &Path) -> Result<Vec<u8>, DockerError> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", context)?;
    Ok(builder.into_inner()?)
}

/// Docker client wrapper for image and container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Builds an image from a local build context and tags it.
    ///
    /// The context directory is archived on the blocking pool, then streamed
    /// to the daemon. Build output is logged at debug level.
    pub async fn build_image(
        &self,
        context: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> Result<(), DockerError> {
        if !context.is_dir() {
            return Err(DockerError::BuildFailed(format!(
                "build context {} is not a directory",
                context.display()
            )));
        }

        let context_dir: PathBuf = context.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archive_build_context(&context_dir))
            .await
            .map_err(|e| DockerError::BuildFailed(format!("Archiving build context: {e}")))??;

        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        info!(tag = tag, context = %context.display(), "Building image");
        let mut stream = self.docker.build_image(options, None, Some(archive.into()));

        while let Some(result) = stream.next().await {
            let build_info =
                result.map_err(|e| DockerError::BuildFailed(format!("Failed to build image: {e}")))?;

            if let Some(error) = build_info.error {
                return Err(DockerError::BuildFailed(error));
            }
            if let Some(line) = build_info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(tag = tag, "{}", line);
                }
            }
        }

        Ok(())
    }

    /// Creates a new container with the given configuration.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    pub async fn create_container(&self, config: ContainerConfig) -> Result<String, DockerError> {
        let container_config = Config {
            image: Some(config.image.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            tty: Some(true),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Creates and starts a detached container, returning its ID.
    pub async fn run_detached(&self, config: ContainerConfig) -> Result<String, DockerError> {
        let image = config.image.clone();
        let id = self.create_container(config).await?;
        self.start_container(&id).await?;
        info!(container = %id, image = %image, "Container started");
        Ok(id)
    }

    /// Executes a command inside a running container.
    ///
    /// # Returns
    ///
    /// `ExecResult` containing exit code, stdout, and stderr.
    pub async fn exec_command(&self, id: &str, cmd: &[&str]) -> Result<ExecResult, DockerError> {
        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, exec_options)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create exec: {e}")))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DockerError::RunFailed(format!("Error reading output: {e}")));
                    }
                }
            }
        }

        let exec_info = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to inspect exec: {e}")))?;

        let exit_code = exec_info.exit_code.unwrap_or(-1);

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}
