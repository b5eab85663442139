// src/engine/mod.rs

//! Scheduling engine.
//!
//! The pure state machine lives in [`core`] (with the per-event logic in
//! [`event_handlers`]); it consumes [`RuntimeEvent`]s and returns the
//! commands and status changes they cause. The async shell that owns the
//! event queue and talks to the process backend is [`runtime`], and
//! [`handle`] is the cloneable view handed to UIs.

use crate::exec::ProbeOutcome;
use crate::types::ExitInfo;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Options for the async scheduler shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Request shutdown by itself once every task is terminal or Ready
    /// (used for `--once`).
    pub exit_when_settled: bool,
}

/// Events flowing into the scheduler from the process backend and the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The task's process was started.
    TaskSpawned { task: TaskName, pid: Option<u32> },
    /// The task's process could not be started.
    SpawnFailed { task: TaskName, error: String },
    /// The task's process exited. Delivered once per process.
    TaskExited { task: TaskName, exit: ExitInfo },
    /// A readiness probe loop finished.
    ProbeFinished {
        task: TaskName,
        outcome: ProbeOutcome,
    },
    /// Graceful shutdown requested (Ctrl-C, UI quit, `--once`).
    ShutdownRequested,
}

impl RuntimeEvent {
    /// Task the event is about, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            RuntimeEvent::TaskSpawned { task, .. }
            | RuntimeEvent::SpawnFailed { task, .. }
            | RuntimeEvent::TaskExited { task, .. }
            | RuntimeEvent::ProbeFinished { task, .. } => Some(task),
            RuntimeEvent::ShutdownRequested => None,
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;
pub mod state;

pub use self::core::SchedulerCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::SchedulerHandle;
pub use runtime::Scheduler;
pub use state::{StatusChange, StatusSnapshot, TaskRuntime, TaskSnapshot};
