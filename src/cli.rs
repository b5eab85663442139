// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `orchestrate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "orchestrate",
    version,
    about = "Run interdependent shell tasks in dependency order and watch their output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(value_name = "CONFIG", default_value = "orchestrate.toml")]
    pub config: String,

    /// Print a commented sample configuration to stdout and exit.
    #[arg(long)]
    pub sample_toml: bool,

    /// Shut down automatically once every task has settled
    /// (finished, failed, blocked, or ready for long-running kinds).
    #[arg(long)]
    pub once: bool,

    /// Parse + validate, print tasks in dependency order, but don't execute
    /// any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ORCHESTRATE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
