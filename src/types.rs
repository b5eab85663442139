// src/types.rs

//! Closed enums shared by the config layer, the scheduler and the UI adapter.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// What a task is expected to do once spawned.
///
/// Each kind contributes exactly two things to the scheduler: the status at
/// which dependents consider it satisfied, and the transition applied right
/// after a successful spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Runs to completion; satisfied on exit code 0.
    #[default]
    Oneshot,
    /// Long-running; satisfied once its readiness probe succeeds.
    Service,
    /// Long-running; satisfied as soon as it has been spawned.
    Daemon,
}

impl TaskKind {
    /// Status at which dependents of a task of this kind may start.
    pub fn satisfied_status(self) -> TaskStatus {
        match self {
            TaskKind::Oneshot => TaskStatus::Succeeded,
            TaskKind::Service | TaskKind::Daemon => TaskStatus::Ready,
        }
    }

    /// Whether the process is expected to stay alive for the whole run.
    pub fn is_long_running(self) -> bool {
        !matches!(self, TaskKind::Oneshot)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Oneshot => "oneshot",
            TaskKind::Service => "service",
            TaskKind::Daemon => "daemon",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oneshot" => Ok(TaskKind::Oneshot),
            "service" => Ok(TaskKind::Service),
            "daemon" => Ok(TaskKind::Daemon),
            other => Err(format!(
                "unknown kind \"{other}\" (expected \"oneshot\", \"service\" or \"daemon\")"
            )),
        }
    }
}

/// Per-task state machine value.
///
/// ```text
/// Pending -> Starting | Blocked
/// Starting -> Running | Failed
/// Running -> Succeeded | Failed          (oneshot)
/// Running -> Ready -> Failed             (daemon)
/// Running -> Probing -> Ready | Failed   (service), Ready -> Failed
/// Running | Probing | Ready -> Stopping -> Stopped   (shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Starting,
    Running,
    Probing,
    Ready,
    Succeeded,
    Failed,
    Stopping,
    Stopped,
    Blocked,
}

impl TaskStatus {
    /// Terminal states never change again during a run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped | TaskStatus::Blocked
        )
    }

    /// Terminal states that prevent dependents from ever starting.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Stopped | TaskStatus::Blocked
        )
    }

    /// States in which a live process exists and accepts stdin.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            TaskStatus::Running | TaskStatus::Probing | TaskStatus::Ready
        )
    }

    /// Status-board glyph.
    pub fn symbol(self) -> &'static str {
        match self {
            TaskStatus::Pending => "□",
            TaskStatus::Starting | TaskStatus::Running | TaskStatus::Probing => "●",
            TaskStatus::Ready => "■",
            TaskStatus::Succeeded => "✓",
            TaskStatus::Failed => "✖",
            TaskStatus::Stopping => "◌",
            TaskStatus::Stopped => "○",
            TaskStatus::Blocked => "⊘",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which channel a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    Stdout,
    Stderr,
    /// Lifecycle notes written by the scheduler itself.
    System,
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
            StreamTag::System => "system",
        })
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitInfo {
    Code(i32),
    Signal(i32),
}

impl ExitInfo {
    pub fn success(self) -> bool {
        matches!(self, ExitInfo::Code(0))
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitInfo::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitInfo::Signal(sig);
            }
        }

        ExitInfo::Code(-1)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exit code {code}"),
            ExitInfo::Signal(sig) => write!(f, "signal {sig}"),
        }
    }
}

/// Compact human duration: `850ms`, `3s`, `1.5s`, `2m`, `1.2h`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        return format!("{}ms", d.as_millis());
    }

    let (value, unit) = if secs >= 3600.0 {
        (secs / 3600.0, "h")
    } else if secs >= 60.0 {
        (secs / 60.0, "m")
    } else {
        (secs, "s")
    };

    if (value - value.trunc()).abs() < 0.05 {
        format!("{}{unit}", value.trunc() as u64)
    } else {
        format!("{value:.1}{unit}")
    }
}
