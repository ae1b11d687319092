//! CLI command definitions for dreamweaver.
//!
//! Without a subcommand the whole pipeline runs; each subcommand runs a
//! single stage against the same configuration file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::execution::SystemCommandRunner;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Default configuration file, looked up in the working directory.
const DEFAULT_CONFIG_PATH: &str = "dreamweaver.toml";

/// Sync a fork with upstream, start its containers and generate LLM artifacts.
#[derive(Parser)]
#[command(name = "dreamweaver")]
#[command(version)]
#[command(
    long_about = "dreamweaver keeps a local fork rebased on its upstream, brings up the project's container environment, requests chat completions concurrently and stores each response under dreamweavers/metadata, then runs the post-processing script inside the container.\n\nExample usage:\n  dreamweaver --config dreamweaver.toml\n  dreamweaver generate"
)]
pub struct Cli {
    /// The stage to run; the full pipeline when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the TOML configuration file.
    #[arg(short, long, env = "DREAMWEAVER_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run every stage in order (the default).
    Run,

    /// Clone the fork if it is missing and install its requirements.
    Setup,

    /// Fetch upstream, rebase the fork onto it and push to origin.
    Sync,

    /// Build and start the container environment.
    Provision,

    /// Request completions concurrently and write prompt<N>.json files.
    #[command(alias = "gen")]
    Generate,

    /// Start the environment, then run the post-processing command in it.
    Exec,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::load(&cli.config).map_err(|e| {
        anyhow::anyhow!("Failed to load configuration {}: {}", cli.config.display(), e)
    })?;
    let pipeline = Pipeline::from_config(Arc::new(config), Arc::new(SystemCommandRunner::new()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let report = pipeline.run().await?;
            info!(
                artifacts = report.artifacts.len(),
                environment = %report.environment,
                "Run complete"
            );
        }
        Commands::Setup => pipeline.setup().await?,
        Commands::Sync => pipeline.sync().await?,
        Commands::Provision => {
            let handle = pipeline.provision().await?;
            info!(environment = %handle, "Environment started");
        }
        Commands::Generate => {
            let artifacts = pipeline.generate().await?;
            for artifact in &artifacts {
                println!("{}", artifact.path.display());
            }
        }
        Commands::Exec => {
            let handle = pipeline.provision().await?;
            let stdout = pipeline.exec(&handle).await?;
            if !stdout.is_empty() {
                print!("{}", stdout);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_subcommand() {
        let cli = Cli::try_parse_from(["dreamweaver"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_subcommand_and_global_flags() {
        let cli = Cli::try_parse_from([
            "dreamweaver",
            "generate",
            "--config",
            "/etc/dw.toml",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Generate));
        assert_eq!(cli.config, PathBuf::from("/etc/dw.toml"));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_gen_alias() {
        let cli = Cli::try_parse_from(["dreamweaver", "gen"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Generate));
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["dreamweaver", "deploy"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_file_fails() {
        let cli = Cli::try_parse_from([
            "dreamweaver",
            "sync",
            "--config",
            "/definitely/not/here/dreamweaver.toml",
        ])
        .unwrap();
        let err = run_with_cli(cli).await.unwrap_err();
        assert!(err.to_string().contains("Failed to load configuration"));
    }
}
