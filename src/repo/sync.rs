//! Local fork setup and upstream synchronisation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::error::RepoError;
use crate::execution::command::{CommandRunner, CommandSpec};
use crate::pipeline::config::PipelineConfig;

/// Remote-tracking namespace the upstream branch is fetched into.
pub const UPSTREAM_REMOTE: &str = "upstream";

/// Keeps the local fork cloned, installed and rebased onto upstream.
pub struct RepoSync {
    runner: Arc<dyn CommandRunner>,
    config: Arc<PipelineConfig>,
}

impl RepoSync {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<PipelineConfig>) -> Self {
        Self { runner, config }
    }

    fn local_path(&self) -> &Path {
        &self.config.local_repo_path
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new("git").arg("-C").path_arg(self.local_path())
    }

    /// `git clone <upstream> <local>`
    pub fn clone_command(&self) -> CommandSpec {
        CommandSpec::new("git")
            .arg("clone")
            .arg(self.config.git.upstream_url.clone())
            .path_arg(self.local_path())
    }

    /// Fetches the upstream branch into `refs/remotes/upstream/<branch>`.
    pub fn fetch_command(&self) -> CommandSpec {
        let branch = &self.config.git.upstream_branch;
        self.git()
            .arg("fetch")
            .arg(self.config.git.upstream_url.clone())
            .arg(format!(
                "+refs/heads/{branch}:refs/remotes/{UPSTREAM_REMOTE}/{branch}"
            ))
    }

    /// `git rebase upstream/<branch>`
    pub fn rebase_command(&self) -> CommandSpec {
        self.git().arg("rebase").arg(format!(
            "{UPSTREAM_REMOTE}/{}",
            self.config.git.upstream_branch
        ))
    }

    /// `git push origin <push_branch>`
    pub fn push_command(&self) -> CommandSpec {
        self.git()
            .args(["push", "origin"])
            .arg(self.config.git.push_branch.clone())
    }

    /// `<python> -m pip install -r <manifest>`
    pub fn install_command(&self, manifest: &Path) -> CommandSpec {
        CommandSpec::new(self.config.setup.python.clone())
            .args(["-m", "pip", "install", "-r"])
            .path_arg(manifest)
    }

    fn manifest_path(&self) -> PathBuf {
        self.local_path().join(&self.config.setup.manifest)
    }

    /// Clones the fork if it is absent and installs its dependency manifest.
    ///
    /// A fresh clone is never fetched, rebased or pushed in the same call.
    ///
    /// # Errors
    ///
    /// - `RepoError::MissingManifest` when the manifest is absent; no install
    ///   is attempted.
    /// - `RepoError::Command` when clone or install fails.
    pub async fn setup(&self) -> Result<(), RepoError> {
        let local = self.local_path();

        if !local.exists() {
            info!(
                upstream = %self.config.git.upstream_url,
                path = %local.display(),
                "Cloning upstream repository"
            );
            self.runner.run(&self.clone_command()).await?;
        }

        let manifest = self.manifest_path();
        if !manifest.is_file() {
            error!(path = %manifest.display(), "Dependency manifest not found");
            return Err(RepoError::MissingManifest { path: manifest });
        }

        info!(manifest = %manifest.display(), "Installing dependencies");
        self.runner.run(&self.install_command(&manifest)).await?;
        Ok(())
    }

    /// Fetches upstream, rebases the fork onto it and pushes to origin.
    ///
    /// The three commands run strictly in sequence; each one starts only
    /// after the previous one succeeded.
    ///
    /// # Errors
    ///
    /// - `RepoError::EnvironmentMissing` when the local clone does not exist.
    /// - `RepoError::Command` carrying stderr of the first failing command.
    pub async fn sync(&self) -> Result<(), RepoError> {
        let local = self.local_path();
        if !local.exists() {
            error!(path = %local.display(), "Directory not found");
            return Err(RepoError::EnvironmentMissing {
                path: local.to_path_buf(),
            });
        }

        info!(
            upstream = %self.config.git.upstream_url,
            branch = %self.config.git.upstream_branch,
            "Syncing with upstream"
        );

        for command in [
            self.fetch_command(),
            self.rebase_command(),
            self.push_command(),
        ] {
            self.runner.run(&command).await?;
        }

        Ok(())
    }
}
