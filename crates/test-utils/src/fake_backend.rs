use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use orchestrate::config::{ConfigFile, TaskSpec};
use orchestrate::engine::{RuntimeEvent, RuntimeOptions, Scheduler, SchedulerCore};
use orchestrate::errors::{OrchestrateError, Result};
use orchestrate::exec::{BackendFuture, ProbeOutcome, ProcessBackend, StdinSink};
use orchestrate::logs::LogStore;
use orchestrate::types::ExitInfo;

/// What the scheduler asked the backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Spawn(String),
    StartProbe(String),
    CancelProbe(String),
    Terminate(String),
}

#[derive(Default)]
struct Script {
    fail_spawn: HashSet<String>,
    exit_on_spawn: HashMap<String, ExitInfo>,
    probe_result: HashMap<String, bool>,
    ignore_terminate: HashSet<String>,
}

/// A fake process backend that:
/// - records every call in order
/// - spawns nothing; pids are made up
/// - answers with scripted events (exits, probe results)
/// - by default, reports an exit by SIGTERM for every terminated task.
///
/// Clones share the recorded calls, so a test can keep one clone and move
/// the other into the scheduler.
#[derive(Clone)]
pub struct FakeBackend {
    events: mpsc::Sender<RuntimeEvent>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
    stdin: Arc<FakeStdin>,
    script: Arc<Mutex<Script>>,
    next_pid: Arc<AtomicU32>,
}

impl FakeBackend {
    pub fn new(events: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            events,
            calls: Arc::new(Mutex::new(Vec::new())),
            stdin: Arc::new(FakeStdin::default()),
            script: Arc::new(Mutex::new(Script::default())),
            next_pid: Arc::new(AtomicU32::new(1000)),
        }
    }

    /// Spawning `task` fails with an OS-like message.
    pub fn fail_spawn(self, task: &str) -> Self {
        self.script.lock().unwrap().fail_spawn.insert(task.to_string());
        self
    }

    /// `task` exits with `exit` right after being spawned.
    pub fn exit_on_spawn(self, task: &str, exit: ExitInfo) -> Self {
        self.script.lock().unwrap().exit_on_spawn.insert(task.to_string(), exit);
        self
    }

    /// Probing `task` finishes at once: Ready if `ready`, else Timeout.
    pub fn probe_result(self, task: &str, ready: bool) -> Self {
        self.script.lock().unwrap().probe_result.insert(task.to_string(), ready);
        self
    }

    /// Terminating `task` reports no exit; the test must send one itself.
    pub fn ignore_terminate(self, task: &str) -> Self {
        self.script.lock().unwrap().ignore_terminate.insert(task.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Spawn(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Terminate(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Lines written through `send_stdin`, as `(task, text)`.
    pub fn stdin_writes(&self) -> Vec<(String, String)> {
        self.stdin.writes.lock().unwrap().clone()
    }

    /// Deliver an event to the scheduler as if a process or probe produced it.
    pub fn inject(&self, event: RuntimeEvent) {
        self.emit(event);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn emit(&self, event: RuntimeEvent) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let _ = tx.send(event).await;
        });
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<Option<u32>>> {
        self.record(BackendCall::Spawn(spec.name.clone()));

        let (fail, exit) = {
            let script = self.script.lock().unwrap();
            (
                script.fail_spawn.contains(&spec.name),
                script.exit_on_spawn.get(&spec.name).copied(),
            )
        };

        let result = if fail {
            Err(OrchestrateError::Spawn {
                task: spec.name.clone(),
                message: "No such file or directory (os error 2)".to_string(),
            })
        } else {
            if let Some(exit) = exit {
                self.emit(RuntimeEvent::TaskExited {
                    task: spec.name.clone(),
                    exit,
                });
            }
            Ok(Some(self.next_pid.fetch_add(1, Ordering::SeqCst)))
        };

        Box::pin(async move { result })
    }

    fn start_probe(&mut self, spec: &TaskSpec) -> BackendFuture<'_, Result<()>> {
        self.record(BackendCall::StartProbe(spec.name.clone()));

        let scripted = self.script.lock().unwrap().probe_result.get(&spec.name).copied();
        if let Some(ready) = scripted {
            let outcome = if ready {
                ProbeOutcome::Ready {
                    attempts: 1,
                    elapsed: Duration::from_millis(10),
                }
            } else {
                ProbeOutcome::Timeout {
                    attempts: 3,
                    elapsed: spec.ready_timeout,
                }
            };
            self.emit(RuntimeEvent::ProbeFinished {
                task: spec.name.clone(),
                outcome,
            });
        }

        Box::pin(async { Ok(()) })
    }

    fn cancel_probe(&mut self, task: &str) {
        self.record(BackendCall::CancelProbe(task.to_string()));
    }

    fn terminate(&mut self, task: &str, _grace: Duration) -> BackendFuture<'_, Result<()>> {
        self.record(BackendCall::Terminate(task.to_string()));

        let ignore = self.script.lock().unwrap().ignore_terminate.contains(task);
        if !ignore {
            self.emit(RuntimeEvent::TaskExited {
                task: task.to_string(),
                exit: ExitInfo::Signal(15),
            });
        }

        Box::pin(async { Ok(()) })
    }

    fn stdin_sink(&self) -> Arc<dyn StdinSink> {
        self.stdin.clone()
    }
}

/// Stdin sink that just remembers what was written.
#[derive(Default)]
pub struct FakeStdin {
    writes: Mutex<Vec<(String, String)>>,
}

impl StdinSink for FakeStdin {
    fn write_line<'a>(&'a self, task: &'a str, text: &'a str) -> BackendFuture<'a, Result<()>> {
        self.writes
            .lock()
            .unwrap()
            .push((task.to_string(), text.to_string()));
        Box::pin(async { Ok(()) })
    }
}

/// Scheduler over a [`FakeBackend`]. `script` configures the backend before
/// it is moved in; the returned clone observes the same calls.
pub fn fake_scheduler(
    cfg: &ConfigFile,
    options: RuntimeOptions,
    script: impl FnOnce(FakeBackend) -> FakeBackend,
) -> (Scheduler<FakeBackend>, FakeBackend) {
    let (tx, rx) = mpsc::channel(64);
    let backend = script(FakeBackend::new(tx.clone()));
    let observer = backend.clone();
    let scheduler = Scheduler::new(
        SchedulerCore::from_config(cfg),
        (tx, rx),
        backend,
        LogStore::from_graph(&cfg.graph),
        cfg.settings.grace_period,
        options,
    );
    (scheduler, observer)
}
