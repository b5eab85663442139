// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The scheduler talks to a `ProcessBackend` instead of the supervisor
//! directly, so tests can swap in a fake that records commands and feeds
//! events back by hand.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::config::model::{RunSettings, TaskSpec};
use crate::engine::RuntimeEvent;
use crate::errors::{OrchestrateError, Result};
use crate::logs::LogStore;

use super::probe::ReadinessProber;
use super::supervisor::ProcessSupervisor;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the scheduler asks of the outside world.
///
/// Results of long-running work (process exits, probe outcomes) come back
/// asynchronously as [`RuntimeEvent`]s on the scheduler's event channel.
pub trait ProcessBackend: Send {
    /// Start the task's process. Returns its pid when known.
    fn spawn(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<Option<u32>>>;

    /// Begin probing a service task.
    fn start_probe(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<()>>;

    fn cancel_probe(&mut self, task: &str);

    /// Stop the task's process, escalating after `grace`. Must not block the
    /// caller until the process is gone.
    fn terminate(&mut self, task: &str, grace: Duration) -> BackendFuture<'_, Result<()>>;

    /// Where [`SchedulerHandle::send_stdin`](crate::engine::SchedulerHandle::send_stdin)
    /// writes to.
    fn stdin_sink(&self) -> Arc<dyn StdinSink>;
}

/// Line-oriented writer to a task's stdin.
pub trait StdinSink: Send + Sync {
    fn write_line<'a>(&'a self, task: &'a str, text: &'a str) -> BackendFuture<'a, Result<()>>;
}

impl StdinSink for ProcessSupervisor {
    fn write_line<'a>(&'a self, task: &'a str, text: &'a str) -> BackendFuture<'a, Result<()>> {
        Box::pin(self.write_stdin(task, text))
    }
}

/// Production backend: real processes plus real readiness probes.
#[derive(Debug, Clone)]
pub struct SupervisorBackend {
    supervisor: ProcessSupervisor,
    prober: ReadinessProber,
    events: mpsc::Sender<RuntimeEvent>,
}

impl SupervisorBackend {
    pub fn new(logs: LogStore, settings: RunSettings, events: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(logs),
            prober: ReadinessProber::new(settings.probe_interval),
            events,
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}

impl ProcessBackend for SupervisorBackend {
    fn spawn(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<Option<u32>>> {
        let result = self
            .supervisor
            .spawn(spec, self.events.clone())
            .map(|handle| handle.pid);
        Box::pin(async move { result })
    }

    fn start_probe(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<()>> {
        let result = match spec.ready_cmd.clone() {
            Some(ready_cmd) => {
                self.prober.start(
                    &spec.name,
                    ready_cmd,
                    spec.workdir.clone(),
                    spec.ready_timeout,
                    self.events.clone(),
                    self.supervisor.exit_watch(&spec.name),
                );
                Ok(())
            }
            None => Err(OrchestrateError::Config(format!(
                "task '{}' has no ready_cmd to probe",
                spec.name
            ))),
        };
        Box::pin(async move { result })
    }

    fn cancel_probe(&mut self, task: &str) {
        self.prober.cancel(task);
    }

    fn terminate(&mut self, task: &str, grace: Duration) -> BackendFuture<'_, Result<()>> {
        let supervisor = self.supervisor.clone();
        let task = task.to_string();
        tokio::spawn(async move {
            if let Err(e) = supervisor.terminate(&task, grace).await {
                warn!(task = %task, error = %e, "terminate failed");
            }
        });
        Box::pin(async { Ok(()) })
    }

    fn stdin_sink(&self) -> Arc<dyn StdinSink> {
        Arc::new(self.supervisor.clone())
    }
}
