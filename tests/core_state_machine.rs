// tests/core_state_machine.rs

use std::time::Duration;

use orchestrate::config::ConfigFile;
use orchestrate::engine::{CoreCommand, CoreStep, RuntimeEvent, SchedulerCore};
use orchestrate::exec::ProbeOutcome;
use orchestrate::types::{ExitInfo, TaskStatus};
use orchestrate_test_utils::{ConfigBuilder, TaskSpecBuilder};

/// setup (oneshot) -> web (service, probed) -> { tests (oneshot), watcher (daemon) }
fn dev_stack() -> ConfigFile {
    ConfigBuilder::new()
        .task(TaskSpecBuilder::oneshot("setup", "make").build())
        .task(
            TaskSpecBuilder::service("web", "serve")
                .depends_on("setup")
                .ready_cmd("curl -sf localhost:8080")
                .ready_timeout(Duration::from_secs(2))
                .build(),
        )
        .task(TaskSpecBuilder::oneshot("tests", "make test").depends_on("web").build())
        .task(TaskSpecBuilder::daemon("watcher", "watch").depends_on("web").build())
        .build()
}

fn spawned(core: &mut SchedulerCore, task: &str) -> CoreStep {
    core.step(RuntimeEvent::TaskSpawned {
        task: task.to_string(),
        pid: Some(42),
    })
}

fn exited(core: &mut SchedulerCore, task: &str, exit: ExitInfo) -> CoreStep {
    core.step(RuntimeEvent::TaskExited {
        task: task.to_string(),
        exit,
    })
}

fn probed(core: &mut SchedulerCore, task: &str, outcome: ProbeOutcome) -> CoreStep {
    core.step(RuntimeEvent::ProbeFinished {
        task: task.to_string(),
        outcome,
    })
}

fn ready() -> ProbeOutcome {
    ProbeOutcome::Ready {
        attempts: 1,
        elapsed: Duration::from_millis(5),
    }
}

fn transitions(step: &CoreStep) -> Vec<(String, TaskStatus, TaskStatus)> {
    step.changes
        .iter()
        .map(|c| (c.task.clone(), c.old, c.new))
        .collect()
}

/// Drive the stack until web is Ready.
fn bring_up_web(core: &mut SchedulerCore) {
    core.start();
    spawned(core, "setup");
    exited(core, "setup", ExitInfo::Code(0));
    spawned(core, "web");
    probed(core, "web", ready());
    assert_eq!(core.status_of("web"), Some(TaskStatus::Ready));
}

#[test]
fn start_spawns_only_roots() {
    let mut core = SchedulerCore::from_config(&dev_stack());

    let step = core.start();
    assert_eq!(step.spawned(), vec!["setup"]);
    assert_eq!(
        transitions(&step),
        vec![("setup".to_string(), TaskStatus::Pending, TaskStatus::Starting)]
    );
    assert!(step.keep_running);
    assert_eq!(core.status_of("web"), Some(TaskStatus::Pending));
}

#[test]
fn evaluation_is_idempotent() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();

    let again = core.evaluate();
    assert!(again.is_empty());
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Starting));
}

#[test]
fn oneshot_success_releases_dependents() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();

    let step = spawned(&mut core, "setup");
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Running));
    assert!(step.commands.is_empty());
    assert_eq!(core.runtime("setup").unwrap().pid, Some(42));

    let step = exited(&mut core, "setup", ExitInfo::Code(0));
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Succeeded));
    assert_eq!(step.spawned(), vec!["web"]);
    assert_eq!(core.status_of("web"), Some(TaskStatus::Starting));

    let setup = core.task_snapshot("setup").unwrap();
    assert!(setup.started_at.is_some());
    assert!(setup.finished_at.is_some());
    assert_eq!(setup.exit, Some(ExitInfo::Code(0)));
    assert!(setup.last_error.is_none());
}

#[test]
fn service_waits_for_probe_before_releasing_dependents() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    exited(&mut core, "setup", ExitInfo::Code(0));

    let step = spawned(&mut core, "web");
    assert_eq!(
        transitions(&step),
        vec![
            ("web".to_string(), TaskStatus::Starting, TaskStatus::Running),
            ("web".to_string(), TaskStatus::Running, TaskStatus::Probing),
        ]
    );
    assert!(matches!(&step.commands[..], [CoreCommand::StartProbe(spec)] if spec.name == "web"));
    assert_eq!(core.status_of("tests"), Some(TaskStatus::Pending));

    let step = probed(&mut core, "web", ready());
    assert_eq!(core.status_of("web"), Some(TaskStatus::Ready));
    let mut started = step.spawned();
    started.sort();
    assert_eq!(started, vec!["tests", "watcher"]);
}

#[test]
fn daemon_becomes_ready_in_the_same_step_it_spawns() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    bring_up_web(&mut core);

    let step = spawned(&mut core, "watcher");
    assert_eq!(
        transitions(&step),
        vec![
            ("watcher".to_string(), TaskStatus::Starting, TaskStatus::Running),
            ("watcher".to_string(), TaskStatus::Running, TaskStatus::Ready),
        ]
    );
}

#[test]
fn service_without_probe_is_ready_on_spawn() {
    let cfg = ConfigBuilder::new()
        .task(TaskSpecBuilder::service("api", "serve").build())
        .task(TaskSpecBuilder::oneshot("client", "curl").depends_on("api").build())
        .build();
    let mut core = SchedulerCore::from_config(&cfg);
    core.start();

    let step = spawned(&mut core, "api");
    assert_eq!(core.status_of("api"), Some(TaskStatus::Ready));
    assert_eq!(step.spawned(), vec!["client"]);
    assert!(!step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::StartProbe(_))));
}

#[test]
fn failure_blocks_the_whole_chain_with_root_cause() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");

    let step = exited(&mut core, "setup", ExitInfo::Code(1));
    assert!(step.spawned().is_empty());

    let snapshot = core.snapshot();
    assert_eq!(snapshot["setup"].status, TaskStatus::Failed);
    assert_eq!(snapshot["setup"].last_error.as_deref(), Some("exited with exit code 1"));

    for task in ["web", "tests", "watcher"] {
        let t = &snapshot[task];
        assert_eq!(t.status, TaskStatus::Blocked, "{task}");
        assert_eq!(t.blocked_by.as_deref(), Some("setup"), "{task}");
        assert!(t.last_error.as_deref().unwrap().contains("'setup'"), "{task}");
        assert!(t.started_at.is_none(), "{task}");
    }
    assert!(core.all_settled());
    assert!(core.any_failed());
}

#[test]
fn spawn_failure_fails_the_task() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();

    core.step(RuntimeEvent::SpawnFailed {
        task: "setup".to_string(),
        error: "No such file or directory (os error 2)".to_string(),
    });

    let setup = core.task_snapshot("setup").unwrap();
    assert_eq!(setup.status, TaskStatus::Failed);
    assert_eq!(
        setup.last_error.as_deref(),
        Some("failed to spawn: No such file or directory (os error 2)")
    );
    assert_eq!(core.status_of("web"), Some(TaskStatus::Blocked));
}

#[test]
fn probe_timeout_fails_and_terminates() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    exited(&mut core, "setup", ExitInfo::Code(0));
    spawned(&mut core, "web");

    let step = probed(
        &mut core,
        "web",
        ProbeOutcome::Timeout {
            attempts: 5,
            elapsed: Duration::from_secs(2),
        },
    );
    assert_eq!(step.commands, vec![CoreCommand::Terminate("web".to_string())]);

    let web = core.task_snapshot("web").unwrap();
    assert_eq!(web.status, TaskStatus::Failed);
    assert_eq!(web.last_error.as_deref(), Some("readiness probe timed out after 2s"));
    assert_eq!(core.status_of("tests"), Some(TaskStatus::Blocked));

    // The terminated process exits later; status stays Failed.
    let step = exited(&mut core, "web", ExitInfo::Signal(15));
    assert!(step.changes.is_empty());
    assert_eq!(core.status_of("web"), Some(TaskStatus::Failed));
    assert_eq!(core.runtime("web").unwrap().exit, Some(ExitInfo::Signal(15)));
}

#[test]
fn exit_while_probing_cancels_probe() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    exited(&mut core, "setup", ExitInfo::Code(0));
    spawned(&mut core, "web");

    let step = exited(&mut core, "web", ExitInfo::Code(2));
    assert!(step.commands.contains(&CoreCommand::CancelProbe("web".to_string())));
    assert_eq!(core.status_of("web"), Some(TaskStatus::Failed));
    assert!(core
        .runtime("web")
        .unwrap()
        .last_error
        .as_deref()
        .unwrap()
        .contains("before becoming ready"));

    // A probe result racing the exit is ignored.
    let step = probed(&mut core, "web", ready());
    assert!(step.is_empty());
    assert_eq!(core.status_of("web"), Some(TaskStatus::Failed));
}

#[test]
fn crash_after_ready_does_not_touch_running_dependents() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    bring_up_web(&mut core);
    spawned(&mut core, "tests");
    spawned(&mut core, "watcher");

    exited(&mut core, "web", ExitInfo::Code(0));
    assert_eq!(core.status_of("web"), Some(TaskStatus::Failed));
    assert_eq!(core.status_of("tests"), Some(TaskStatus::Running));
    assert_eq!(core.status_of("watcher"), Some(TaskStatus::Ready));
}

#[test]
fn crash_after_ready_blocks_dependents_still_pending() {
    let cfg = ConfigBuilder::new()
        .task(TaskSpecBuilder::daemon("cache", "redis-server").build())
        .task(TaskSpecBuilder::oneshot("seed", "load-fixtures").build())
        .task(
            TaskSpecBuilder::oneshot("app", "run-app")
                .depends_on("cache")
                .depends_on("seed")
                .build(),
        )
        .build();
    let mut core = SchedulerCore::from_config(&cfg);
    core.start();
    spawned(&mut core, "cache");
    spawned(&mut core, "seed");
    assert_eq!(core.status_of("cache"), Some(TaskStatus::Ready));
    assert_eq!(core.status_of("app"), Some(TaskStatus::Pending));

    let step = exited(&mut core, "cache", ExitInfo::Signal(9));
    assert_eq!(core.status_of("cache"), Some(TaskStatus::Failed));
    assert_eq!(core.status_of("app"), Some(TaskStatus::Blocked));
    assert!(step.spawned().is_empty());

    let app = core.runtime("app").unwrap();
    assert_eq!(app.blocked_by.as_deref(), Some("cache"));
    assert_eq!(app.last_error.as_deref(), Some("dependency 'cache' failed"));

    // The other dependency finishing later does not revive it.
    let step = exited(&mut core, "seed", ExitInfo::Code(0));
    assert_eq!(core.status_of("seed"), Some(TaskStatus::Succeeded));
    assert_eq!(core.status_of("app"), Some(TaskStatus::Blocked));
    assert!(step.spawned().is_empty());
}

#[test]
fn duplicate_exit_is_ignored() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    exited(&mut core, "setup", ExitInfo::Code(0));

    let step = exited(&mut core, "setup", ExitInfo::Code(9));
    assert!(step.is_empty());
    assert_eq!(core.runtime("setup").unwrap().exit, Some(ExitInfo::Code(0)));
}

#[test]
fn diamond_starts_join_exactly_once() {
    let cfg = ConfigBuilder::new()
        .task(TaskSpecBuilder::oneshot("a", "true").build())
        .task(TaskSpecBuilder::oneshot("b", "true").depends_on("a").build())
        .task(TaskSpecBuilder::daemon("c", "sleep 9").depends_on("a").build())
        .task(
            TaskSpecBuilder::oneshot("d", "true")
                .depends_on("b")
                .depends_on("c")
                .build(),
        )
        .build();
    let mut core = SchedulerCore::from_config(&cfg);
    core.start();
    spawned(&mut core, "a");
    exited(&mut core, "a", ExitInfo::Code(0));

    spawned(&mut core, "b");
    let step = exited(&mut core, "b", ExitInfo::Code(0));
    assert!(step.spawned().is_empty());
    assert_eq!(core.status_of("d"), Some(TaskStatus::Pending));

    let step = spawned(&mut core, "c");
    assert_eq!(step.spawned(), vec!["d"]);
    assert!(core.evaluate().is_empty());
}

#[test]
fn shutdown_stops_pending_and_terminates_live_tasks() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    exited(&mut core, "setup", ExitInfo::Code(0));
    spawned(&mut core, "web");
    assert_eq!(core.status_of("web"), Some(TaskStatus::Probing));

    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(step.keep_running);
    assert!(core.is_shutting_down());
    assert_eq!(
        step.commands,
        vec![
            CoreCommand::CancelProbe("web".to_string()),
            CoreCommand::Terminate("web".to_string()),
        ]
    );

    for task in ["tests", "watcher"] {
        let t = core.task_snapshot(task).unwrap();
        assert_eq!(t.status, TaskStatus::Stopped);
        assert_eq!(t.last_error.as_deref(), Some("shutdown requested before start"));
    }
    assert_eq!(core.status_of("web"), Some(TaskStatus::Stopping));
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Succeeded));

    // Idempotent.
    let again = core.step(RuntimeEvent::ShutdownRequested);
    assert!(again.is_empty());

    // A probe result arriving after shutdown does not revive the service.
    assert!(probed(&mut core, "web", ready()).is_empty());

    let step = exited(&mut core, "web", ExitInfo::Signal(15));
    assert_eq!(core.status_of("web"), Some(TaskStatus::Stopped));
    assert!(!step.keep_running);
    assert!(core.is_finished());
}

#[test]
fn spawn_completing_during_shutdown_is_stopped() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();

    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(step.commands.is_empty());
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Starting));

    let step = spawned(&mut core, "setup");
    assert_eq!(
        transitions(&step),
        vec![
            ("setup".to_string(), TaskStatus::Starting, TaskStatus::Running),
            ("setup".to_string(), TaskStatus::Running, TaskStatus::Stopping),
        ]
    );
    assert_eq!(step.commands, vec![CoreCommand::Terminate("setup".to_string())]);

    exited(&mut core, "setup", ExitInfo::Signal(15));
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Stopped));
    assert!(core.is_finished());
}

#[test]
fn nothing_starts_after_shutdown() {
    let mut core = SchedulerCore::from_config(&dev_stack());
    core.start();
    spawned(&mut core, "setup");
    core.step(RuntimeEvent::ShutdownRequested);

    // setup was terminated but happened to exit cleanly.
    let step = exited(&mut core, "setup", ExitInfo::Code(0));
    assert!(step.spawned().is_empty());
    assert_eq!(core.status_of("setup"), Some(TaskStatus::Stopped));
    assert_eq!(core.status_of("web"), Some(TaskStatus::Stopped));
}
