// src/config/validate.rs

//! Raw TOML model -> resolved [`TaskSpec`]s -> validated [`ConfigFile`].
//!
//! Field-level problems (missing name, unknown kind, bad duration, ...) are
//! reported here; structural problems (duplicates, unknown dependencies,
//! misplaced `ready_cmd`, cycles) are reported by
//! [`DependencyGraph::build`](crate::dag::DependencyGraph::build).

use std::path::{Path, PathBuf};

use crate::config::model::{
    ConfigFile, DEFAULT_READY_TIMEOUT, DurationValue, RawConfigFile,
    RawTaskConfig, RunSettings, TaskSpec,
};
use crate::errors::{OrchestrateError, Result};
use crate::types::TaskKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OrchestrateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let settings = resolve_settings(&raw)?;
        let base_dir = std::env::current_dir()?;
        let specs = raw
            .task
            .iter()
            .map(|task| resolve_task(task, &raw, &settings, &base_dir))
            .collect::<Result<Vec<_>>>()?;
        ConfigFile::from_specs(settings, specs)
    }
}

/// Validate a raw config without keeping the result.
pub fn validate_config(raw: &RawConfigFile) -> Result<()> {
    ConfigFile::try_from(raw.clone()).map(|_| ())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(OrchestrateError::Config(
            "config must contain at least one [[task]] table".to_string(),
        ));
    }
    Ok(())
}

fn resolve_settings(cfg: &RawConfigFile) -> Result<RunSettings> {
    let mut settings = RunSettings::default();
    let defaults = &cfg.defaults;

    if let Some(max_lines) = defaults.max_lines {
        if max_lines == 0 {
            return Err(OrchestrateError::Config(
                "[defaults].max_lines must be >= 1 (got 0)".to_string(),
            ));
        }
        settings.max_lines = max_lines;
    }

    if let Some(ref value) = defaults.probe_interval {
        let interval = defaults_duration("probe_interval", value)?;
        if interval.is_zero() {
            return Err(OrchestrateError::Config(
                "[defaults].probe_interval must be greater than zero".to_string(),
            ));
        }
        settings.probe_interval = interval;
    }

    if let Some(ref value) = defaults.grace_period {
        settings.grace_period = defaults_duration("grace_period", value)?;
    }

    Ok(settings)
}

fn defaults_duration(field: &str, value: &DurationValue) -> Result<std::time::Duration> {
    value
        .to_duration()
        .map_err(|e| OrchestrateError::Config(format!("[defaults].{field}: {e}")))
}

fn resolve_task(
    task: &RawTaskConfig,
    cfg: &RawConfigFile,
    settings: &RunSettings,
    base_dir: &Path,
) -> Result<TaskSpec> {
    let name = task.name.trim().to_string();
    if name.is_empty() {
        return Err(OrchestrateError::Config(format!(
            "every [[task]] needs a non-empty `name` (task with cmd {:?})",
            task.cmd
        )));
    }

    let kind = match task.kind.as_deref() {
        None => TaskKind::default(),
        Some(text) => text.parse::<TaskKind>().map_err(|message| {
            OrchestrateError::UnknownKind {
                task: name.clone(),
                message,
            }
        })?,
    };

    if task.cmd.trim().is_empty() {
        return Err(invalid(&name, "cmd", "must not be empty"));
    }

    let command = match cfg.defaults.cmd_prefix.as_deref().map(str::trim) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix} && {}", task.cmd),
        _ => task.cmd.clone(),
    };

    let ready_cmd = match task.ready_cmd.as_deref() {
        Some(cmd) if cmd.trim().is_empty() => {
            return Err(invalid(&name, "ready_cmd", "must not be empty when present"));
        }
        other => other.map(str::to_string),
    };

    let ready_timeout = match task.ready_timeout.as_ref().or(cfg.defaults.ready_timeout.as_ref()) {
        Some(value) => value
            .to_duration()
            .map_err(|e| invalid(&name, "ready_timeout", &e))?,
        None => DEFAULT_READY_TIMEOUT,
    };

    let max_lines = task.max_lines.unwrap_or(settings.max_lines);
    if max_lines == 0 {
        return Err(invalid(&name, "max_lines", "must be >= 1 (got 0)"));
    }

    let workdir_text = task
        .workdir
        .as_deref()
        .or(cfg.defaults.workdir.as_deref())
        .unwrap_or(".");
    let workdir = resolve_workdir(workdir_text, base_dir);

    let mut depends_on: Vec<String> = Vec::with_capacity(task.depends_on.len());
    for dep in &task.depends_on {
        let dep = dep.trim().to_string();
        if !depends_on.contains(&dep) {
            depends_on.push(dep);
        }
    }

    Ok(TaskSpec {
        name,
        kind,
        command,
        workdir,
        depends_on,
        ready_cmd,
        ready_timeout,
        max_lines,
    })
}

fn invalid(task: &str, field: &'static str, message: &str) -> OrchestrateError {
    OrchestrateError::InvalidField {
        task: task.to_string(),
        field,
        message: message.to_string(),
    }
}

/// Expand a leading `~/` and make relative paths absolute against `base_dir`.
fn resolve_workdir(text: &str, base_dir: &Path) -> PathBuf {
    let expanded = match text.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(text),
        },
        None if text == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(text)),
        None => PathBuf::from(text),
    };

    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}
