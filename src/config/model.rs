// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::DependencyGraph;
use crate::engine::TaskName;
use crate::types::TaskKind;

/// Default readiness timeout for service tasks.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default ring-buffer capacity per task.
pub const DEFAULT_MAX_LINES: usize = 2000;
/// Default delay between readiness probe attempts.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);
/// Default SIGTERM -> SIGKILL escalation delay.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [defaults]
/// workdir = "."
/// ready_timeout = 30
/// max_lines = 2000
///
/// [[task]]
/// name = "setup"
/// kind = "oneshot"
/// cmd  = "make build"
///
/// [[task]]
/// name = "web"
/// kind = "service"
/// cmd  = "python -m http.server 9781"
/// depends_on = ["setup"]
/// ready_cmd = "nc -z localhost 9781"
/// ```
///
/// Tasks are an array of tables so that duplicate names can be reported
/// instead of silently collapsing into one map entry.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Values applied to tasks that do not override them.
    #[serde(default)]
    pub defaults: DefaultsSection,

    /// All `[[task]]` tables, in file order.
    #[serde(default)]
    pub task: Vec<RawTaskConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultsSection {
    /// Working directory for tasks that omit `workdir`.
    #[serde(default)]
    pub workdir: Option<String>,

    /// Command run before every task's `cmd`, joined with `&&`.
    #[serde(default)]
    pub cmd_prefix: Option<String>,

    #[serde(default)]
    pub ready_timeout: Option<DurationValue>,

    #[serde(default)]
    pub max_lines: Option<usize>,

    /// Delay between readiness probe attempts.
    #[serde(default)]
    pub probe_interval: Option<DurationValue>,

    /// How long a stopping process gets between SIGTERM and SIGKILL.
    #[serde(default)]
    pub grace_period: Option<DurationValue>,
}

/// One `[[task]]` table.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTaskConfig {
    #[serde(default)]
    pub name: String,

    /// Kept as text so an unknown kind can be reported with the task name.
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub cmd: String,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Readiness probe; only valid when `kind = "service"`.
    #[serde(default)]
    pub ready_cmd: Option<String>,

    #[serde(default)]
    pub workdir: Option<String>,

    #[serde(default)]
    pub ready_timeout: Option<DurationValue>,

    #[serde(default)]
    pub max_lines: Option<usize>,
}

/// A duration written either as a number of seconds (`30`, `0.5`) or as a
/// string with a unit suffix (`"250ms"`, `"3s"`, `"1m"`, `"2h"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            DurationValue::Seconds(secs) => {
                if !secs.is_finite() || *secs < 0.0 {
                    return Err(format!("invalid duration {secs}; expected a non-negative number of seconds"));
                }
                Duration::try_from_secs_f64(*secs).map_err(|_| format!("duration {secs}s is too large"))
            }
            DurationValue::Text(s) => parse_duration(s),
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let too_large = || format!("duration '{s}' is too large");
    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs).ok_or_else(too_large),
        "h" => value.checked_mul(60 * 60).map(Duration::from_secs).ok_or_else(too_large),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

/// Immutable, fully-resolved description of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: TaskName,
    pub kind: TaskKind,
    /// Shell command line (already carrying any `cmd_prefix`).
    pub command: String,
    pub workdir: PathBuf,
    /// Direct dependencies, de-duplicated, in declaration order.
    pub depends_on: Vec<TaskName>,
    pub ready_cmd: Option<String>,
    pub ready_timeout: Duration,
    /// Ring-buffer capacity for this task's captured output.
    pub max_lines: usize,
}

/// Run-wide settings that are not attached to a single task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub probe_interval: Duration,
    pub grace_period: Duration,
    /// Process-wide fallback ring capacity.
    pub max_lines: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

/// Validated configuration: resolved run settings plus the dependency graph,
/// which owns the task specs.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `config::validate`)
/// or [`ConfigFile::from_specs`], both of which run full graph validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: RunSettings,
    pub graph: DependencyGraph,
}

impl ConfigFile {
    /// Build a validated config directly from resolved specs.
    pub fn from_specs(settings: RunSettings, specs: Vec<TaskSpec>) -> crate::errors::Result<Self> {
        let graph = DependencyGraph::build(specs)?;
        Ok(Self { settings, graph })
    }

    /// Task specs in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.graph.specs()
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.graph.spec(name)
    }
}
