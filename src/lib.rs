// src/lib.rs

pub mod cli;
pub mod config;
pub mod console;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod logs;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{RuntimeOptions, Scheduler, SchedulerHandle};
use crate::exec::ProcessSupervisor;
use crate::types::{TaskStatus, format_duration};

const PRINTER_DRAIN: Duration = Duration::from_millis(100);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the scheduler with the real process backend
/// - the console printer and stdin forwarder
/// - Ctrl-C handling
///
/// Returns `Ok(true)` when no task ended Failed or Blocked.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    info!(path = %config_path.display(), tasks = cfg.graph.len(), "config loaded");

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(true);
    }

    let options = RuntimeOptions {
        exit_when_settled: args.once,
    };
    let scheduler = Scheduler::for_config(&cfg, options);
    let handle = scheduler.handle();

    let width = console::name_width(cfg.graph.topological_order().iter().map(String::as_str));
    let printer = console::spawn_printer(&handle, width);
    let _stdin = console::spawn_stdin_forwarder(handle.clone());
    spawn_ctrl_c_handler(handle.clone(), scheduler.backend().supervisor().clone());

    let snapshot = scheduler.run().await.context("scheduler failed")?;

    // Let the printer catch up with the final System lines.
    tokio::time::sleep(PRINTER_DRAIN).await;
    printer.abort();

    println!();
    print!("{}", console::format_summary(&snapshot));

    let ok = !snapshot
        .values()
        .any(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Blocked));
    Ok(ok)
}

/// First Ctrl-C requests a graceful shutdown; a second one kills whatever is
/// still running and exits at once.
fn spawn_ctrl_c_handler(handle: SchedulerHandle, supervisor: ProcessSupervisor) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; stopping tasks");
        handle.request_shutdown().await;

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second Ctrl+C; exiting without waiting for tasks");
            supervisor.kill_all();
            std::process::exit(130);
        }
    });
}

/// Simple dry-run output: tasks in start order with their settings.
fn print_dry_run(cfg: &ConfigFile) {
    println!("orchestrate dry-run");
    println!(
        "  probe_interval = {}, grace_period = {}",
        format_duration(cfg.settings.probe_interval),
        format_duration(cfg.settings.grace_period)
    );
    println!();

    println!("tasks ({}), in start order:", cfg.graph.len());
    for name in cfg.graph.topological_order() {
        let Some(task) = cfg.task(name) else {
            continue;
        };
        println!("  - {name} ({})", task.kind);
        println!("      cmd: {}", task.command);
        println!("      workdir: {}", task.workdir.display());
        if !task.depends_on.is_empty() {
            println!("      depends_on: {:?}", task.depends_on);
        }
        if let Some(ref ready_cmd) = task.ready_cmd {
            println!("      ready_cmd: {ready_cmd}");
            println!("      ready_timeout: {}", format_duration(task.ready_timeout));
        }
        println!("      max_lines: {}", task.max_lines);
    }

    debug!("dry-run complete (no execution)");
}
