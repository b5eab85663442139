// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{OrchestrateError, Result};
use crate::exec::{ProbeOutcome, ProcessBackend, SupervisorBackend};
use crate::logs::{DEFAULT_SUBSCRIBER_CAPACITY, LogLine, LogStore};
use crate::types::StreamTag;

use super::core::SchedulerCore;
use super::handle::SchedulerHandle;
use super::state::{StatusChange, StatusSnapshot};
use super::{CoreCommand, CoreStep, RuntimeEvent, RuntimeOptions};

/// Capacity of the scheduler's inbound event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Drives [`SchedulerCore`] from a single event queue and delegates the
/// resulting commands to a [`ProcessBackend`].
///
/// All task state is mutated on this loop only. Results that a command
/// produces synchronously (the outcome of a spawn) are fed back before the
/// next queued event, so a daemon goes Starting -> Running -> Ready in one
/// pass. Every transition is published to the status watch, the change
/// broadcast and, as a `System` line, the task's log.
pub struct Scheduler<B: ProcessBackend> {
    core: SchedulerCore,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    logs: LogStore,
    grace_period: std::time::Duration,
    options: RuntimeOptions,
    status_tx: watch::Sender<StatusSnapshot>,
    changes_tx: broadcast::Sender<StatusChange>,
}

impl<B: ProcessBackend> fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Scheduler<SupervisorBackend> {
    /// Scheduler wired to real processes for a validated config.
    pub fn for_config(cfg: &ConfigFile, options: RuntimeOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let logs = LogStore::from_graph(&cfg.graph);
        let backend = SupervisorBackend::new(logs.clone(), cfg.settings, event_tx.clone());
        Scheduler::new(
            SchedulerCore::from_config(cfg),
            (event_tx, event_rx),
            backend,
            logs,
            cfg.settings.grace_period,
            options,
        )
    }
}

impl<B: ProcessBackend> Scheduler<B> {
    /// `events` must be the channel the backend reports on.
    pub fn new(
        core: SchedulerCore,
        events: (mpsc::Sender<RuntimeEvent>, mpsc::Receiver<RuntimeEvent>),
        backend: B,
        logs: LogStore,
        grace_period: std::time::Duration,
        options: RuntimeOptions,
    ) -> Self {
        let (event_tx, event_rx) = events;
        let (status_tx, _) = watch::channel(core.snapshot());
        let (changes_tx, _) = broadcast::channel(DEFAULT_SUBSCRIBER_CAPACITY);
        Self {
            core,
            event_tx,
            event_rx,
            backend,
            logs,
            grace_period,
            options,
            status_tx,
            changes_tx,
        }
    }

    /// Cloneable view for UIs. May be taken before or while running.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(
            self.event_tx.clone(),
            self.status_tx.subscribe(),
            self.changes_tx.clone(),
            self.logs.clone(),
            self.backend.stdin_sink(),
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Main event loop.
    ///
    /// Starts every root task, then processes events until shutdown was
    /// requested and all tasks are terminal. Returns the final snapshot.
    pub async fn run(mut self) -> Result<StatusSnapshot> {
        info!(tasks = self.core.graph().len(), "scheduler started");

        let step = self.core.start();
        self.drive(step).await?;
        self.shutdown_if_settled().await?;

        while !self.core.is_finished() {
            let Some(event) = self.event_rx.recv().await else {
                info!("scheduler event channel closed; exiting");
                break;
            };

            debug!(?event, "scheduler received event");
            self.process(event).await?;
            self.shutdown_if_settled().await?;
        }

        info!("scheduler finished");
        Ok(self.core.snapshot())
    }

    /// Feed one event, and everything it synchronously causes, through the core.
    async fn process(&mut self, event: RuntimeEvent) -> Result<()> {
        let step = self.core.step(event);
        self.drive(step).await
    }

    /// Apply `step`, then keep stepping the core with the follow-up events
    /// its commands produced until none are left.
    async fn drive(&mut self, step: CoreStep) -> Result<()> {
        let mut pending = VecDeque::from(self.apply(step).await?);
        while let Some(event) = pending.pop_front() {
            let step = self.core.step(event);
            pending.extend(self.apply(step).await?);
        }
        Ok(())
    }

    async fn shutdown_if_settled(&mut self) -> Result<()> {
        if self.options.exit_when_settled && !self.core.is_shutting_down() && self.core.all_settled() {
            info!("all tasks settled; shutting down");
            self.process(RuntimeEvent::ShutdownRequested).await?;
        }
        Ok(())
    }

    /// Publish a step's transitions and execute its commands. Returns the
    /// follow-up events produced by the commands.
    async fn apply(&mut self, step: CoreStep) -> Result<Vec<RuntimeEvent>> {
        self.publish(&step.changes);

        let mut follow_ups = Vec::new();
        for command in step.commands {
            if let Some(event) = self.execute(command).await? {
                follow_ups.push(event);
            }
        }
        Ok(follow_ups)
    }

    fn publish(&self, changes: &[StatusChange]) {
        if changes.is_empty() {
            return;
        }

        self.status_tx.send_replace(self.core.snapshot());

        for change in changes {
            if let Err(e) = self
                .logs
                .append(&change.task, LogLine::new(StreamTag::System, change.log_text()))
            {
                warn!(task = %change.task, error = %e, "could not record status change in log");
            }
            // No receivers is fine.
            let _ = self.changes_tx.send(change.clone());
        }
    }

    async fn execute(&mut self, command: CoreCommand) -> Result<Option<RuntimeEvent>> {
        match command {
            CoreCommand::Spawn(spec) => {
                let task = spec.name.clone();
                match self.backend.spawn(&spec).await {
                    Ok(pid) => Ok(Some(RuntimeEvent::TaskSpawned { task, pid })),
                    Err(OrchestrateError::Spawn { message, .. }) => {
                        warn!(task = %task, error = %message, "failed to spawn task");
                        Ok(Some(RuntimeEvent::SpawnFailed { task, error: message }))
                    }
                    Err(e) => {
                        warn!(task = %task, error = %e, "failed to spawn task");
                        Ok(Some(RuntimeEvent::SpawnFailed {
                            task,
                            error: e.to_string(),
                        }))
                    }
                }
            }
            CoreCommand::StartProbe(spec) => match self.backend.start_probe(&spec).await {
                Ok(()) => Ok(None),
                Err(e) => Ok(Some(RuntimeEvent::ProbeFinished {
                    task: spec.name.clone(),
                    outcome: ProbeOutcome::Error(e.to_string()),
                })),
            },
            CoreCommand::CancelProbe(task) => {
                self.backend.cancel_probe(&task);
                Ok(None)
            }
            CoreCommand::Terminate(task) => {
                if let Err(e) = self.backend.terminate(&task, self.grace_period).await {
                    warn!(task = %task, error = %e, "terminate request failed");
                }
                Ok(None)
            }
        }
    }
}
