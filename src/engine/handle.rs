// src/engine/handle.rs

//! UI-facing handle onto a running scheduler.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::errors::{OrchestrateError, Result};
use crate::exec::StdinSink;
use crate::logs::{LogLine, LogStore, Subscription, TaggedLogLine};
use crate::types::TaskStatus;

use super::state::{StatusChange, StatusSnapshot, TaskSnapshot};
use super::RuntimeEvent;

/// Cloneable, thread-safe access to scheduler state, logs and controls.
///
/// Reads never block the scheduler: status comes from a watch channel the
/// scheduler republishes after each transition, logs come straight from the
/// [`LogStore`].
#[derive(Clone)]
pub struct SchedulerHandle {
    events: mpsc::Sender<RuntimeEvent>,
    status_rx: watch::Receiver<StatusSnapshot>,
    changes_tx: broadcast::Sender<StatusChange>,
    logs: LogStore,
    stdin: Arc<dyn StdinSink>,
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("logs", &self.logs)
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    pub(crate) fn new(
        events: mpsc::Sender<RuntimeEvent>,
        status_rx: watch::Receiver<StatusSnapshot>,
        changes_tx: broadcast::Sender<StatusChange>,
        logs: LogStore,
        stdin: Arc<dyn StdinSink>,
    ) -> Self {
        Self {
            events,
            status_rx,
            changes_tx,
            logs,
            stdin,
        }
    }

    /// Consistent copy of every task's state.
    pub fn get_status_snapshot(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    pub fn task_snapshot(&self, task: &str) -> Option<TaskSnapshot> {
        self.status_rx.borrow().get(task).cloned()
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.status_rx.borrow().get(task).map(|t| t.status)
    }

    /// Live stream of transitions from now on.
    pub fn status_changes(&self) -> Subscription<StatusChange> {
        Subscription::new(self.changes_tx.subscribe())
    }

    /// Watch receiver over the full snapshot.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    /// Wait until `predicate` holds for the current snapshot, then return it.
    /// Returns `None` if the scheduler went away first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Option<StatusSnapshot>
    where
        F: FnMut(&StatusSnapshot) -> bool,
    {
        let mut rx = self.status_rx.clone();
        let result = rx.wait_for(|snapshot| predicate(snapshot)).await;
        result.ok().map(|snapshot| snapshot.clone())
    }

    pub fn snapshot_logs(&self, task: &str) -> Result<Vec<LogLine>> {
        self.logs.snapshot(task)
    }

    pub fn subscribe_logs(&self, task: &str) -> Result<Subscription<LogLine>> {
        self.logs.subscribe(task)
    }

    /// Backlog and live stream with nothing lost or repeated in between.
    pub fn snapshot_and_subscribe_logs(&self, task: &str) -> Result<(Vec<LogLine>, Subscription<LogLine>)> {
        self.logs.snapshot_and_subscribe(task)
    }

    pub fn snapshot_all_logs(&self) -> Vec<TaggedLogLine> {
        self.logs.snapshot_all()
    }

    pub fn subscribe_all_logs(&self) -> Subscription<TaggedLogLine> {
        self.logs.subscribe_all()
    }

    /// Write a line to a live task's stdin.
    ///
    /// Fails with [`OrchestrateError::ProcessNotRunning`] unless the task is
    /// Running, Probing or Ready.
    pub async fn send_stdin(&self, task: &str, text: &str) -> Result<()> {
        let status = self
            .status_of(task)
            .ok_or_else(|| OrchestrateError::TaskNotFound(task.to_string()))?;
        if !status.is_live() {
            return Err(OrchestrateError::ProcessNotRunning(task.to_string()));
        }
        self.stdin.write_line(task, text).await
    }

    /// Ask the scheduler to shut down. Idempotent; succeeds even if the
    /// scheduler already finished.
    pub async fn request_shutdown(&self) {
        if self.events.send(RuntimeEvent::ShutdownRequested).await.is_err() {
            debug!("scheduler already stopped; shutdown request ignored");
        }
    }
}
