// src/logging.rs

//! Diagnostics for the orchestrator itself, via `tracing`.
//!
//! Task output never goes through here; the console prints it on stdout.
//! Diagnostics go to stderr, filtered by an [`EnvFilter`] built from the
//! first of:
//! 1. `ORCHESTRATE_LOG` directives (e.g. `orchestrate::exec=debug,info`)
//! 2. `RUST_LOG` directives
//! 3. the `--log-level` flag
//! 4. the caller-supplied default

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variables consulted for filter directives, in order.
pub const LOG_ENV_VARS: [&str; 2] = ["ORCHESTRATE_LOG", "RUST_LOG"];

/// Where the active filter came from, for the startup debug line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSource {
    Env(&'static str),
    Cli,
    Default,
}

/// Pick the filter directives. `lookup` reads an environment variable;
/// blank values are skipped.
pub fn filter_directives<F>(cli_level: Option<LogLevel>, default: Level, lookup: F) -> (String, FilterSource)
where
    F: Fn(&str) -> Option<String>,
{
    for var in LOG_ENV_VARS {
        if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
            return (value.trim().to_string(), FilterSource::Env(var));
        }
    }
    match cli_level {
        Some(lvl) => (level_of(lvl).to_string().to_lowercase(), FilterSource::Cli),
        None => (default.to_string().to_lowercase(), FilterSource::Default),
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Directives that do not parse fall back to the flag or default level
/// instead of failing the run.
pub fn init_logging(cli_level: Option<LogLevel>, default: Level) -> Result<()> {
    let (directives, source) = filter_directives(cli_level, default, |var| std::env::var(var).ok());
    let fallback = cli_level.map(level_of).unwrap_or(default);

    let (filter, rejected) = match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(fallback.to_string().to_lowercase()), Some(e)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("initialising tracing subscriber: {e}"))?;

    match rejected {
        Some(e) => tracing::warn!(%directives, ?source, error = %e, "ignoring invalid log filter"),
        None => tracing::debug!(%directives, ?source, "logging initialised"),
    }
    Ok(())
}

fn level_of(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}
