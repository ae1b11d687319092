//! Command-line interface for dreamweaver.
//!
//! Provides the full pipeline run and one command per stage.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
