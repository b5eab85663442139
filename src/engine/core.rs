// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`SchedulerCore`] consumes [`RuntimeEvent`]s and produces a [`CoreStep`]:
//! the status transitions that happened and the commands the async shell
//! should execute. It owns no channels, no Tokio types, and performs no IO,
//! so every scheduling rule can be tested synchronously.

use tracing::info;

use crate::config::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::event_handlers::{
    CoreStep, evaluate_pending, handle_exited, handle_probe_finished, handle_shutdown,
    handle_spawn_failed, handle_spawned,
};
use crate::engine::state::{CoreState, StatusSnapshot, TaskRuntime, TaskSnapshot};
use crate::engine::RuntimeEvent;
use crate::types::TaskStatus;

#[derive(Debug)]
pub struct SchedulerCore {
    state: CoreState,
}

impl SchedulerCore {
    /// Every task starts out Pending.
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            state: CoreState::new(graph),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.graph.clone())
    }

    /// Initial evaluation: every task without dependencies moves to
    /// Starting and gets a Spawn command.
    pub fn start(&mut self) -> CoreStep {
        info!(tasks = self.state.graph.len(), "starting scheduler");
        self.evaluate()
    }

    /// Handle one event, then re-evaluate Pending tasks.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let mut step = CoreStep::default();
        let state = &mut self.state;

        match &event {
            RuntimeEvent::TaskSpawned { task, pid } => handle_spawned(state, &mut step, task, *pid),
            RuntimeEvent::SpawnFailed { task, error } => {
                handle_spawn_failed(state, &mut step, task, error)
            }
            RuntimeEvent::TaskExited { task, exit } => handle_exited(state, &mut step, task, *exit),
            RuntimeEvent::ProbeFinished { task, outcome } => {
                handle_probe_finished(state, &mut step, task, outcome)
            }
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                handle_shutdown(state, &mut step)
            }
        }

        evaluate_pending(state, &mut step);
        step.keep_running = !self.is_finished();
        step
    }

    /// Re-evaluate Pending tasks without a new event. Idempotent: a second
    /// call with no intervening event produces an empty step.
    pub fn evaluate(&mut self) -> CoreStep {
        let mut step = CoreStep::default();
        evaluate_pending(&mut self.state, &mut step);
        step.keep_running = !self.is_finished();
        step
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.state.graph
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.state.status_of(task)
    }

    pub fn runtime(&self, task: &str) -> Option<&TaskRuntime> {
        self.state.tasks.get(task)
    }

    pub fn task_snapshot(&self, task: &str) -> Option<TaskSnapshot> {
        self.runtime(task).map(TaskRuntime::snapshot)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down
    }

    /// Shutdown was requested and every task reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.state.shutting_down && self.state.all_terminal()
    }

    /// Every task is terminal or Ready; nothing more will start by itself.
    pub fn all_settled(&self) -> bool {
        self.state.all_settled()
    }

    /// Whether any task ended Failed or Blocked.
    pub fn any_failed(&self) -> bool {
        self.state
            .tasks
            .values()
            .any(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Blocked))
    }
}
