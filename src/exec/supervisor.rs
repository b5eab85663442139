// src/exec/supervisor.rs

//! OS process lifecycle: spawn, capture output, forward stdin, terminate.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::model::TaskSpec;
use crate::engine::{RuntimeEvent, TaskName};
use crate::errors::{OrchestrateError, Result};
use crate::logs::{LogLine, LogStore};
use crate::types::{ExitInfo, StreamTag};

/// How long the exit waiter gives each output reader to drain before the
/// exit reaches the scheduler. Bounded because a backgrounded grandchild may
/// keep the pipes open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How long to wait for the exit after SIGKILL before giving up.
const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").ok());

/// Build a shell invocation appropriate for the platform.
pub(crate) fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// A spawned process as seen by its owner.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub task: TaskName,
    pub pid: Option<u32>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    /// Wait for the process to exit. Returns `None` only if the exit waiter
    /// went away without reporting (runtime shutdown).
    pub async fn wait(&mut self) -> Option<ExitInfo> {
        match self.exit_rx.wait_for(|exit| exit.is_some()).await {
            Ok(exit) => *exit,
            Err(_) => None,
        }
    }

    /// Exit information if the process has already exited.
    pub fn exit(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit().is_none()
    }
}

#[derive(Debug)]
struct ProcessEntry {
    pid: Option<u32>,
    stdin: Option<Arc<tokio::sync::Mutex<ChildStdin>>>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

/// Owns every process started for a run.
///
/// Cheap to clone; clones share the same process table. Output of each
/// process is streamed line by line into the [`LogStore`]; exits are
/// reported to the scheduler as [`RuntimeEvent::TaskExited`], exactly once
/// per process.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    logs: LogStore,
    processes: Arc<Mutex<HashMap<TaskName, ProcessEntry>>>,
}

impl ProcessSupervisor {
    pub fn new(logs: LogStore) -> Self {
        Self {
            logs,
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Launch `spec.command` in `spec.workdir`.
    ///
    /// On failure (missing shell, bad workdir, permissions) returns
    /// [`OrchestrateError::Spawn`] carrying the OS message; no handle exists
    /// in that case. On success the output readers and the exit waiter are
    /// already running.
    pub fn spawn(&self, spec: &TaskSpec, events: mpsc::Sender<RuntimeEvent>) -> Result<ProcessHandle> {
        info!(
            task = %spec.name,
            cmd = %spec.command,
            workdir = %spec.workdir.display(),
            "starting task process"
        );

        let mut cmd = shell_command(&spec.command);
        cmd.current_dir(&spec.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so termination reaches everything the shell starts.
        #[cfg(unix)]
        cmd.process_group(0);

        // The shell dies with us even if we exit without cleaning up.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| OrchestrateError::Spawn {
            task: spec.name.clone(),
            message: format!("{} (workdir {})", e, spec.workdir.display()),
        })?;

        let pid = child.id();
        let stdin = child.stdin.take().map(|s| Arc::new(tokio::sync::Mutex::new(s)));
        let readers: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|out| self.read_output(&spec.name, StreamTag::Stdout, out)),
            child
                .stderr
                .take()
                .map(|err| self.read_output(&spec.name, StreamTag::Stderr, err)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        self.table().insert(
            spec.name.clone(),
            ProcessEntry {
                pid,
                stdin,
                kill_tx: Some(kill_tx),
                exit_rx: exit_rx.clone(),
            },
        );

        let task = spec.name.clone();
        let processes = Arc::clone(&self.processes);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                kill = &mut kill_rx => {
                    if kill.is_ok() {
                        if let Err(e) = child.start_kill() {
                            warn!(task = %task, error = %e, "failed to kill child process");
                        }
                    }
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => {
                    error!(task = %task, error = %e, "waiting for task process failed");
                    ExitInfo::Code(-1)
                }
            };

            // Visible to exit watchers (a running readiness probe) right away;
            // the scheduler event waits for the output below.
            if let Some(entry) = processes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&task)
            {
                entry.stdin = None;
                entry.kill_tx = None;
            }
            exit_tx.send_replace(Some(exit));

            info!(task = %task, pid, %exit, "task process exited");

            for reader in readers {
                if timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                    debug!(task = %task, "output still open after exit; not waiting further");
                }
            }

            if events
                .send(RuntimeEvent::TaskExited {
                    task: task.clone(),
                    exit,
                })
                .await
                .is_err()
            {
                debug!(task = %task, "scheduler gone; exit event dropped");
            }
        });

        Ok(ProcessHandle {
            task: spec.name.clone(),
            pid,
            exit_rx,
        })
    }

    /// Continuously read one output stream, tagging each line and appending
    /// it to the task's log buffer. Runs as its own Tokio task.
    pub fn read_output<R>(&self, task: &str, stream: StreamTag, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let logs = self.logs.clone();
        let task = task.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf: Vec<u8> = Vec::new();

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = sanitize_line(&buf);
                        if let Err(e) = logs.append(&task, LogLine::new(stream, text)) {
                            warn!(task = %task, error = %e, "dropping output line");
                        }
                    }
                    Err(e) => {
                        debug!(task = %task, %stream, error = %e, "output stream read error");
                        break;
                    }
                }
            }

            debug!(task = %task, %stream, "output stream closed");
        })
    }

    /// Write `text` plus a newline to the task's stdin.
    pub async fn write_stdin(&self, task: &str, text: &str) -> Result<()> {
        let stdin = self
            .table()
            .get(task)
            .and_then(|entry| entry.stdin.clone())
            .ok_or_else(|| OrchestrateError::ProcessNotRunning(task.to_string()))?;

        let mut data = String::with_capacity(text.len() + 1);
        data.push_str(text);
        data.push('\n');

        let mut stdin = stdin.lock().await;
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;

        debug!(task = %task, bytes = data.len(), "wrote to stdin");
        Ok(())
    }

    /// Ask the process to stop, escalating to a forced kill after `grace`.
    ///
    /// Returns once the process has exited (or the kill wait timed out).
    /// Calling this for a process that already exited is a no-op.
    pub async fn terminate(&self, task: &str, grace: Duration) -> Result<()> {
        let (pid, mut exit_rx) = {
            let table = self.table();
            let Some(entry) = table.get(task) else {
                return Err(OrchestrateError::ProcessNotRunning(task.to_string()));
            };
            (entry.pid, entry.exit_rx.clone())
        };

        if exit_rx.borrow().is_some() {
            debug!(task = %task, "terminate: process already exited");
            return Ok(());
        }

        info!(task = %task, pid, grace_ms = grace.as_millis() as u64, "terminating task process");
        send_graceful_stop(task, pid);

        let exited = timeout(grace, exit_rx.wait_for(|exit| exit.is_some()))
            .await
            .map(|waited| waited.is_ok());
        if exited == Ok(true) {
            return Ok(());
        }

        warn!(task = %task, pid, "process still alive after grace period; killing");
        force_kill_group(task, pid);
        if let Some(kill_tx) = self.table().get_mut(task).and_then(|e| e.kill_tx.take()) {
            let _ = kill_tx.send(());
        }

        if timeout(KILL_WAIT_TIMEOUT, exit_rx.wait_for(|exit| exit.is_some()))
            .await
            .is_err()
        {
            warn!(task = %task, pid, "process did not report exit after kill");
        }

        Ok(())
    }

    /// Forcefully kill every process group still running, without waiting.
    /// Returns how many were signalled.
    ///
    /// Meant for a forced exit, where nothing will reap the children later.
    pub fn kill_all(&self) -> usize {
        let mut table = self.table();
        let mut killed = 0;
        for (task, entry) in table.iter_mut() {
            if entry.exit_rx.borrow().is_some() {
                continue;
            }
            force_kill_group(task, entry.pid);
            if let Some(kill_tx) = entry.kill_tx.take() {
                let _ = kill_tx.send(());
            }
            killed += 1;
        }
        if killed > 0 {
            warn!(killed, "killed remaining task processes");
        }
        killed
    }

    /// Watch that turns `Some` as soon as the task's current process exits,
    /// ahead of the [`RuntimeEvent::TaskExited`] event.
    pub fn exit_watch(&self, task: &str) -> Option<watch::Receiver<Option<ExitInfo>>> {
        self.table().get(task).map(|e| e.exit_rx.clone())
    }

    pub fn pid(&self, task: &str) -> Option<u32> {
        self.table().get(task).and_then(|e| e.pid)
    }

    pub fn is_running(&self, task: &str) -> bool {
        self.table()
            .get(task)
            .map(|e| e.exit_rx.borrow().is_none())
            .unwrap_or(false)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TaskName, ProcessEntry>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lossy UTF-8, without the line terminator and ANSI escape sequences.
fn sanitize_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(['\n', '\r']);
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // The child was started with process_group(0), so its pgid equals its pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn send_graceful_stop(task: &str, pid: Option<u32>) {
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, libc::SIGTERM) {
            debug!(task = %task, pid, error = %e, "SIGTERM failed (process may be gone)");
        }
    }
}

#[cfg(not(unix))]
fn send_graceful_stop(task: &str, pid: Option<u32>) {
    debug!(task = %task, ?pid, "no graceful stop signal on this platform");
}

#[cfg(unix)]
fn force_kill_group(task: &str, pid: Option<u32>) {
    if let Some(pid) = pid {
        if let Err(e) = signal_group(pid, libc::SIGKILL) {
            debug!(task = %task, pid, error = %e, "SIGKILL failed (process may be gone)");
        }
    }
}

#[cfg(not(unix))]
fn force_kill_group(_task: &str, _pid: Option<u32>) {}
