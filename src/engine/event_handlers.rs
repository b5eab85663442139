// src/engine/event_handlers.rs

//! Event handling logic for the scheduler core.
//!
//! Every handler takes the shared [`CoreState`] and a [`CoreStep`] to fill
//! with status changes and commands. None of them performs IO.

use tracing::{debug, warn};

use crate::config::model::TaskSpec;
use crate::engine::TaskName;
use crate::engine::state::{CoreState, StatusChange};
use crate::exec::ProbeOutcome;
use crate::types::{ExitInfo, TaskKind, TaskStatus, format_duration};

/// Command produced by the pure core, to be executed by the async shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Start the task's process.
    Spawn(TaskSpec),
    /// Begin readiness probing for a service task.
    StartProbe(TaskSpec),
    /// Abandon a running probe.
    CancelProbe(TaskName),
    /// Stop the task's process (SIGTERM, then SIGKILL after the grace period).
    Terminate(TaskName),
}

/// Everything that resulted from handling one event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Transitions in the order they were applied.
    pub changes: Vec<StatusChange>,
    /// Commands the shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// False once shutdown was requested and every task is terminal.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.commands.is_empty()
    }

    /// Names of the tasks this step asked to spawn.
    pub fn spawned(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Spawn(spec) => Some(spec.name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The task's process is up.
pub(crate) fn handle_spawned(state: &mut CoreState, step: &mut CoreStep, task: &str, pid: Option<u32>) {
    if state.status_of(task) != Some(TaskStatus::Starting) {
        warn!(task = %task, status = ?state.status_of(task), "spawn report for task not in Starting; ignored");
        return;
    }

    let Some(spec) = state.tasks.get_mut(task).map(|rt| {
        rt.pid = pid;
        rt.spec.clone()
    }) else {
        return;
    };

    state.transition(task, TaskStatus::Running, None, step);

    if state.shutting_down {
        state.transition(task, TaskStatus::Stopping, None, step);
        step.commands.push(CoreCommand::Terminate(task.to_string()));
        return;
    }

    match spec.kind {
        TaskKind::Oneshot => {}
        TaskKind::Daemon => state.transition(task, TaskStatus::Ready, None, step),
        TaskKind::Service => {
            if spec.ready_cmd.is_some() {
                state.transition(task, TaskStatus::Probing, None, step);
                step.commands.push(CoreCommand::StartProbe((*spec).clone()));
            } else {
                state.transition(task, TaskStatus::Ready, None, step);
            }
        }
    }
}

/// The task's process could not be started.
pub(crate) fn handle_spawn_failed(state: &mut CoreState, step: &mut CoreStep, task: &str, error: &str) {
    if state.status_of(task) != Some(TaskStatus::Starting) {
        warn!(task = %task, "spawn failure for task not in Starting; ignored");
        return;
    }
    state.transition(
        task,
        TaskStatus::Failed,
        Some(format!("failed to spawn: {error}")),
        step,
    );
}

/// The task's process exited.
pub(crate) fn handle_exited(state: &mut CoreState, step: &mut CoreStep, task: &str, exit: ExitInfo) {
    let Some(rt) = state.tasks.get_mut(task) else {
        warn!(task = %task, "exit for unknown task ignored");
        return;
    };

    if rt.exit.is_some() {
        debug!(task = %task, %exit, "duplicate exit report ignored");
        return;
    }
    rt.exit = Some(exit);
    let kind = rt.spec.kind;
    let status = rt.status;

    match status {
        TaskStatus::Running if kind == TaskKind::Oneshot => {
            if exit.success() {
                state.transition(task, TaskStatus::Succeeded, None, step);
            } else {
                state.transition(task, TaskStatus::Failed, Some(format!("exited with {exit}")), step);
            }
        }
        TaskStatus::Running => {
            state.transition(
                task,
                TaskStatus::Failed,
                Some(format!("exited unexpectedly ({exit})")),
                step,
            );
        }
        TaskStatus::Probing => {
            step.commands.push(CoreCommand::CancelProbe(task.to_string()));
            state.transition(
                task,
                TaskStatus::Failed,
                Some(format!("exited before becoming ready ({exit})")),
                step,
            );
        }
        TaskStatus::Ready => {
            state.transition(
                task,
                TaskStatus::Failed,
                Some(format!("exited unexpectedly after becoming ready ({exit})")),
                step,
            );
        }
        TaskStatus::Stopping => {
            state.transition(
                task,
                TaskStatus::Stopped,
                Some(format!("stopped by shutdown ({exit})")),
                step,
            );
        }
        TaskStatus::Pending | TaskStatus::Starting => {
            warn!(task = %task, %status, %exit, "exit for task that never reported a spawn");
        }
        TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped | TaskStatus::Blocked => {
            debug!(task = %task, %status, %exit, "exit recorded for task already in a terminal state");
        }
    }
}

/// A readiness probe loop finished.
pub(crate) fn handle_probe_finished(
    state: &mut CoreState,
    step: &mut CoreStep,
    task: &str,
    outcome: &ProbeOutcome,
) {
    if state.status_of(task) != Some(TaskStatus::Probing) {
        debug!(task = %task, ?outcome, "late probe result ignored");
        return;
    }

    match outcome {
        ProbeOutcome::Ready { .. } => state.transition(task, TaskStatus::Ready, None, step),
        ProbeOutcome::Timeout { elapsed, .. } => {
            state.transition(
                task,
                TaskStatus::Failed,
                Some(format!(
                    "readiness probe timed out after {}",
                    format_duration(*elapsed)
                )),
                step,
            );
            step.commands.push(CoreCommand::Terminate(task.to_string()));
        }
        ProbeOutcome::Error(message) => {
            state.transition(
                task,
                TaskStatus::Failed,
                Some(format!("readiness probe could not run: {message}")),
                step,
            );
            step.commands.push(CoreCommand::Terminate(task.to_string()));
        }
    }
}

/// Stop starting new work and wind down everything that is alive.
///
/// Idempotent. Terminations are issued dependents-first.
pub(crate) fn handle_shutdown(state: &mut CoreState, step: &mut CoreStep) {
    if state.shutting_down {
        debug!("shutdown already in progress");
        return;
    }
    state.shutting_down = true;

    let order: Vec<TaskName> = state.graph.topological_order().iter().rev().cloned().collect();
    for task in order {
        match state.status_of(&task) {
            Some(TaskStatus::Pending) => {
                state.transition(
                    &task,
                    TaskStatus::Stopped,
                    Some("shutdown requested before start".to_string()),
                    step,
                );
            }
            Some(TaskStatus::Probing) => {
                step.commands.push(CoreCommand::CancelProbe(task.clone()));
                state.transition(&task, TaskStatus::Stopping, None, step);
                step.commands.push(CoreCommand::Terminate(task));
            }
            Some(TaskStatus::Running | TaskStatus::Ready) => {
                state.transition(&task, TaskStatus::Stopping, None, step);
                step.commands.push(CoreCommand::Terminate(task));
            }
            // Starting tasks are handled when their spawn result arrives.
            _ => {}
        }
    }
}

/// Start or block every Pending task whose dependencies allow it.
///
/// Walks tasks in topological order, so a block propagates through a whole
/// chain in one pass. Safe to call repeatedly.
pub(crate) fn evaluate_pending(state: &mut CoreState, step: &mut CoreStep) {
    if state.shutting_down {
        return;
    }

    let order: Vec<TaskName> = state.graph.topological_order().to_vec();
    for task in order {
        let Some(rt) = state.tasks.get(&task) else {
            continue;
        };
        if rt.status != TaskStatus::Pending {
            continue;
        }
        let spec = rt.spec.clone();

        let mut blocked: Option<(String, TaskName)> = None;
        let mut all_satisfied = true;

        for dep in &spec.depends_on {
            let Some(dep_rt) = state.tasks.get(dep) else {
                all_satisfied = false;
                continue;
            };
            match dep_rt.status {
                TaskStatus::Failed => {
                    blocked = Some((format!("dependency '{dep}' failed"), dep.clone()));
                    break;
                }
                TaskStatus::Blocked => {
                    let root = dep_rt.blocked_by.clone().unwrap_or_else(|| dep.clone());
                    blocked = Some((
                        format!("dependency '{dep}' is blocked (root cause: '{root}' failed)"),
                        root,
                    ));
                    break;
                }
                TaskStatus::Stopped => {
                    blocked = Some((
                        format!("dependency '{dep}' was stopped before it was satisfied"),
                        dep.clone(),
                    ));
                    break;
                }
                status if status == dep_rt.spec.kind.satisfied_status() => {}
                _ => all_satisfied = false,
            }
        }

        if let Some((reason, root)) = blocked {
            if let Some(rt) = state.tasks.get_mut(&task) {
                rt.blocked_by = Some(root);
            }
            state.transition(&task, TaskStatus::Blocked, Some(reason), step);
        } else if all_satisfied {
            state.transition(&task, TaskStatus::Starting, None, step);
            step.commands.push(CoreCommand::Spawn((*spec).clone()));
        }
    }
}
