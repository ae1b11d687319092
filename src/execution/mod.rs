//! Host and container execution layer.
//!
//! Host commands (git, pip, docker compose) go through [`CommandRunner`],
//! whose production implementation offloads the blocking child process to
//! tokio's blocking pool. Container environments are provisioned and
//! addressed through [`ContainerRuntime`].
//!
//! # Example
//!
//! ```ignore
//! use dreamweaver::execution::{CommandSpec, CommandRunner, SystemCommandRunner};
//!
//! let runner = SystemCommandRunner::new();
//! let spec = CommandSpec::new("git").args(["-C", "/srv/fork", "status"]);
//! let output = runner.run(&spec).await?;
//! println!("{}", output.stdout);
//! ```

pub mod command;
pub mod docker_client;
pub mod provisioner;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use docker_client::{ContainerConfig, DockerClient, ExecResult};
pub use provisioner::{
    runtime_from_config, ComposeRuntime, ContainerRuntime, DirectRuntime, EnvironmentHandle,
    ExecOutput,
};
