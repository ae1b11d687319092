//! dreamweaver CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.
//! Runs on a single-threaded scheduler; blocking work is moved to the
//! blocking pool by the components that need it.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level
    let cli = dreamweaver::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    // Run the CLI with parsed arguments
    dreamweaver::cli::run_with_cli(cli).await
}
