// src/exec/probe.rs

//! Readiness probing for service tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, TaskName};
use crate::exec::supervisor::shell_command;
use crate::types::{ExitInfo, format_duration};

/// Result of a finished probe loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// An attempt exited with status 0.
    Ready { attempts: u32, elapsed: Duration },
    /// No attempt succeeded before the deadline.
    Timeout { attempts: u32, elapsed: Duration },
    /// The probe could not be started at all.
    Error(String),
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }
}

/// Run `ready_cmd` repeatedly until it exits 0 or `timeout` elapses.
///
/// Attempts are sequential and scheduled on a fixed grid of `interval`
/// ticks measured from the start. A running attempt is killed when the
/// deadline passes. Never reports a timeout before `timeout` has elapsed.
pub async fn probe_until_ready(
    ready_cmd: &str,
    workdir: &Path,
    timeout: Duration,
    interval: Duration,
) -> ProbeOutcome {
    let start = Instant::now();
    let deadline = start + timeout;
    let interval = interval.max(Duration::from_millis(1));
    let mut next_tick = start;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match timeout_at(deadline, run_attempt(ready_cmd, workdir)).await {
            Ok(true) => {
                return ProbeOutcome::Ready {
                    attempts,
                    elapsed: start.elapsed(),
                };
            }
            Ok(false) => {}
            Err(_) => break,
        }

        let now = Instant::now();
        while next_tick <= now {
            next_tick += interval;
        }
        if next_tick >= deadline {
            sleep_until(deadline).await;
            break;
        }
        sleep_until(next_tick).await;
    }

    ProbeOutcome::Timeout {
        attempts,
        elapsed: start.elapsed(),
    }
}

/// One probe attempt. Output is discarded; a spawn error counts as a failed
/// attempt.
async fn run_attempt(ready_cmd: &str, workdir: &Path) -> bool {
    let mut cmd = shell_command(ready_cmd);
    cmd.current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match cmd.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            warn!(cmd = %ready_cmd, error = %e, "failed to run readiness probe");
            false
        }
    }
}

/// Resolves once the watched process has exited; never without a watch.
async fn main_process_exit(main_exit: Option<watch::Receiver<Option<ExitInfo>>>) -> Option<ExitInfo> {
    let Some(mut rx) = main_exit else {
        return std::future::pending().await;
    };
    match rx.wait_for(|exit| exit.is_some()).await {
        Ok(exit) => *exit,
        Err(_) => None,
    }
}

/// Runs one probe loop per service task in the background and reports each
/// outcome as [`RuntimeEvent::ProbeFinished`].
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    interval: Duration,
    active: Arc<Mutex<HashMap<TaskName, oneshot::Sender<()>>>>,
}

impl ReadinessProber {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start probing `task`.
    ///
    /// A cancelled probe reports nothing. So does a probe whose `main_exit`
    /// watch reports that the service process is gone: that exit arrives as
    /// its own event and fails the task.
    pub fn start(
        &self,
        task: &str,
        ready_cmd: String,
        workdir: PathBuf,
        ready_timeout: Duration,
        events: mpsc::Sender<RuntimeEvent>,
        main_exit: Option<watch::Receiver<Option<ExitInfo>>>,
    ) {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        if let Some(previous) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.to_string(), cancel_tx)
        {
            let _ = previous.send(());
        }

        info!(
            task = %task,
            cmd = %ready_cmd,
            timeout = %format_duration(ready_timeout),
            "starting readiness probe"
        );

        let task = task.to_string();
        let interval = self.interval;
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel_rx => {
                    debug!(task = %task, "readiness probe cancelled");
                    return;
                }
                exit = main_process_exit(main_exit) => {
                    debug!(task = %task, ?exit, "service exited while probing; probe abandoned");
                    active
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&task);
                    return;
                }
                outcome = probe_until_ready(&ready_cmd, &workdir, ready_timeout, interval) => outcome,
            };

            active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task);

            debug!(task = %task, ?outcome, "readiness probe finished");
            if events
                .send(RuntimeEvent::ProbeFinished { task, outcome })
                .await
                .is_err()
            {
                debug!("scheduler gone; probe result dropped");
            }
        });
    }

    /// Stop probing `task`. Returns whether a probe was running.
    pub fn cancel(&self, task: &str) -> bool {
        match self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task)
        {
            Some(cancel_tx) => {
                let _ = cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_probing(&self, task: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(task)
    }
}
