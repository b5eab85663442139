// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`supervisor`] spawns task processes under `sh -c`, streams their
//!   output into the log store and reports exits.
//! - [`probe`] runs readiness probes for service tasks.
//! - [`backend`] provides the `ProcessBackend` trait the scheduler drives and
//!   the production `SupervisorBackend`; tests replace it with a fake.

pub mod backend;
pub mod probe;
pub mod supervisor;

pub use backend::{BackendFuture, ProcessBackend, StdinSink, SupervisorBackend};
pub use probe::{ProbeOutcome, ReadinessProber, probe_until_ready};
pub use supervisor::{ProcessHandle, ProcessSupervisor};
