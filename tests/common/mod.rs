#![allow(dead_code)]

use std::error::Error;
use std::path::{Path, PathBuf};

use orchestrate::types::TaskStatus;
use orchestrate::engine::StatusSnapshot;

pub use orchestrate_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Write `contents` to `dir/orchestrate.toml` and return the path.
pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("orchestrate.toml");
    std::fs::write(&path, contents).expect("failed to write test config");
    path
}

/// Status of `task` in `snapshot`; panics if the task is missing.
pub fn status(snapshot: &StatusSnapshot, task: &str) -> TaskStatus {
    snapshot
        .get(task)
        .unwrap_or_else(|| panic!("task {task} missing from snapshot"))
        .status
}
