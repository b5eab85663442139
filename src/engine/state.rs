// src/engine/state.rs

//! Per-task runtime records and the read-only views derived from them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::config::model::TaskSpec;
use crate::dag::DependencyGraph;
use crate::engine::TaskName;
use crate::engine::event_handlers::CoreStep;
use crate::types::{ExitInfo, TaskKind, TaskStatus};

/// Mutable runtime record for one task. Owned by the scheduler core.
#[derive(Debug, Clone)]
pub struct TaskRuntime {
    pub spec: Arc<TaskSpec>,
    pub status: TaskStatus,
    pub pid: Option<u32>,
    /// Set at most once, when the process exit is first observed.
    pub exit: Option<ExitInfo>,
    /// Human-readable reason for Failed, Blocked and Stopped.
    pub last_error: Option<String>,
    /// Root-cause task for Blocked.
    pub blocked_by: Option<TaskName>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl TaskRuntime {
    pub fn new(spec: Arc<TaskSpec>) -> Self {
        Self {
            spec,
            status: TaskStatus::Pending,
            pid: None,
            exit: None,
            last_error: None,
            blocked_by: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            name: self.spec.name.clone(),
            kind: self.spec.kind,
            status: self.status,
            depends_on: self.spec.depends_on.clone(),
            pid: self.pid,
            exit: self.exit,
            last_error: self.last_error.clone(),
            blocked_by: self.blocked_by.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Copy of one task's state, safe to hand out across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub name: TaskName,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub depends_on: Vec<TaskName>,
    pub pid: Option<u32>,
    pub exit: Option<ExitInfo>,
    pub last_error: Option<String>,
    pub blocked_by: Option<TaskName>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl TaskSnapshot {
    /// Wall-clock run time: until `finished_at`, or until now if still going.
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Local::now);
        (end - start).to_std().ok()
    }
}

/// Status of every task, keyed by name.
pub type StatusSnapshot = BTreeMap<TaskName, TaskSnapshot>;

/// One status transition, as published to UI subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub task: TaskName,
    pub old: TaskStatus,
    pub new: TaskStatus,
    pub reason: Option<String>,
    pub at: DateTime<Local>,
}

impl StatusChange {
    /// Line recorded in the task's log as a `System` entry.
    pub fn log_text(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} -> {}: {}", self.old, self.new, reason),
            None => format!("{} -> {}", self.old, self.new),
        }
    }
}

/// State shared by the core and the event handlers.
#[derive(Debug)]
pub(crate) struct CoreState {
    pub(crate) graph: DependencyGraph,
    pub(crate) tasks: HashMap<TaskName, TaskRuntime>,
    pub(crate) shutting_down: bool,
}

impl CoreState {
    pub(crate) fn new(graph: DependencyGraph) -> Self {
        let tasks = graph
            .specs()
            .map(|spec| (spec.name.clone(), TaskRuntime::new(Arc::new(spec.clone()))))
            .collect();
        Self {
            graph,
            tasks,
            shutting_down: false,
        }
    }

    pub(crate) fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.tasks.get(task).map(|t| t.status)
    }

    /// Move `task` to `new`, stamping times and recording the change in `step`.
    ///
    /// `reason` becomes the task's `last_error` for failure statuses.
    pub(crate) fn transition(
        &mut self,
        task: &str,
        new: TaskStatus,
        reason: Option<String>,
        step: &mut CoreStep,
    ) {
        let Some(rt) = self.tasks.get_mut(task) else {
            warn!(task = %task, status = %new, "transition for unknown task ignored");
            return;
        };

        let old = rt.status;
        if old == new {
            return;
        }

        let now = Local::now();
        rt.status = new;
        if new == TaskStatus::Running && rt.started_at.is_none() {
            rt.started_at = Some(now);
        }
        if new.is_terminal() && rt.finished_at.is_none() {
            rt.finished_at = Some(now);
        }
        if new.is_failure() {
            rt.last_error = reason.clone();
        }

        match (&reason, new.is_failure()) {
            (Some(reason), true) => info!(task = %task, from = %old, to = %new, %reason, "task status changed"),
            _ => debug!(task = %task, from = %old, to = %new, "task status changed"),
        }

        step.changes.push(StatusChange {
            task: task.to_string(),
            old,
            new,
            reason,
            at: now,
        });
    }

    pub(crate) fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    pub(crate) fn all_settled(&self) -> bool {
        self.tasks
            .values()
            .all(|t| t.status.is_terminal() || t.status == TaskStatus::Ready)
    }

    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        self.tasks
            .iter()
            .map(|(name, rt)| (name.clone(), rt.snapshot()))
            .collect()
    }
}
