// src/config/sample.rs

/// Commented sample configuration printed by `orchestrate --sample-toml`.
///
/// Works on any vanilla macOS/Linux box: only needs `sh`, Python 3 (for the
/// built-in HTTP server), coreutils and `nc` for the port probe.
pub const SAMPLE_CONFIG: &str = r#"###############################################################################
# orchestrate.toml - tasks for the orchestrator
#
# Each task is a [[task]] table. A task starts only once every task named in
# its `depends_on` is satisfied:
#   oneshot - satisfied when it exits with status 0
#   service - satisfied when its `ready_cmd` first exits with status 0
#   daemon  - satisfied as soon as it has been started
###############################################################################

[defaults]
# Where commands run when a task omits `workdir`.
workdir = "."
# Optional command run before each task's `cmd`, joined with `&&`.
cmd_prefix = ""
# How long a service may take to pass its readiness probe (seconds or "30s").
ready_timeout = 30
# Output lines kept per task.
max_lines = 2000
# Delay between readiness probe attempts.
probe_interval = "500ms"
# Time between SIGTERM and SIGKILL on shutdown.
grace_period = "5s"

# A "oneshot" task runs to completion and then exits.
[[task]]
name = "setup"
kind = "oneshot"
cmd  = "sleep 1 && echo '[setup] done'"

# A "service" stays alive and is READY once `ready_cmd` succeeds.
[[task]]
name       = "web"
kind       = "service"
cmd        = "python3 -m http.server 9781"
depends_on = ["setup"]
ready_cmd  = "nc -z localhost 9781"
ready_timeout = "20s"

# Another "oneshot" that waits for the web service to be ready.
[[task]]
name       = "tests"
kind       = "oneshot"
cmd        = "sleep 2 && echo '[tests] integration suite okay'"
depends_on = ["web"]

# A "daemon" is long-running and counts as ready as soon as it starts.
[[task]]
name       = "watcher"
kind       = "daemon"
cmd        = "tail -f /dev/null"
depends_on = ["web"]
"#;
