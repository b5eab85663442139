// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

use crate::types::TaskKind;

#[derive(Error, Debug)]
pub enum OrchestrateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: task '{task}', field `{field}`: {message}")]
    InvalidField {
        task: String,
        field: &'static str,
        message: String,
    },

    #[error("Configuration error: task '{task}', field `kind`: {message}")]
    UnknownKind { task: String, message: String },

    #[error("Configuration error: duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("Configuration error: task '{task}' has unknown dependency '{dependency}' in `depends_on`")]
    UnknownDependency { task: String, dependency: String },

    #[error("Configuration error: task '{task}' sets `ready_cmd` but is kind '{kind}' (only 'service' tasks may be probed)")]
    ReadyCmdOnNonService { task: String, kind: TaskKind },

    #[error("Cycle detected in task dependencies: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task '{0}' has no running process")]
    ProcessNotRunning(String),

    #[error("Failed to spawn task '{task}': {message}")]
    Spawn { task: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OrchestrateError>;
