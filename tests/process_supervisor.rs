// tests/process_supervisor.rs

#![cfg(unix)]

mod common;
use crate::common::{TestResult, init_tracing, with_timeout};

use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc;

use orchestrate::engine::RuntimeEvent;
use orchestrate::errors::OrchestrateError;
use orchestrate::exec::{ProbeOutcome, ProcessSupervisor, ReadinessProber, probe_until_ready};
use orchestrate::logs::LogStore;
use orchestrate::types::{ExitInfo, StreamTag};
use orchestrate_test_utils::TaskSpecBuilder;

fn store(task: &str) -> LogStore {
    LogStore::new([(task.to_string(), 100)])
}

async fn next_exit(rx: &mut mpsc::Receiver<RuntimeEvent>) -> (String, ExitInfo) {
    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::TaskExited { task, exit }) => (task, exit),
        other => panic!("expected TaskExited, got {other:?}"),
    }
}

#[tokio::test]
async fn output_is_captured_line_by_line_before_the_exit_is_reported() -> TestResult {
    init_tracing();

    let logs = store("hello");
    let supervisor = ProcessSupervisor::new(logs.clone());
    let (tx, mut rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::oneshot(
        "hello",
        r"echo one; echo two 1>&2; printf '\033[31mred\033[0m\r\n'; printf 'no newline'",
    )
    .build();
    let handle = supervisor.spawn(&spec, tx)?;
    assert!(handle.pid.is_some());

    let (task, exit) = next_exit(&mut rx).await;
    assert_eq!(task, "hello");
    assert_eq!(exit, ExitInfo::Code(0));

    let lines = logs.snapshot("hello")?;
    let stdout: Vec<&str> = lines
        .iter()
        .filter(|l| l.stream == StreamTag::Stdout)
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(stdout, vec!["one", "red", "no newline"]);

    let stderr: Vec<&str> = lines
        .iter()
        .filter(|l| l.stream == StreamTag::Stderr)
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(stderr, vec!["two"]);
    Ok(())
}

#[tokio::test]
async fn exit_codes_and_handle_wait() -> TestResult {
    init_tracing();

    let supervisor = ProcessSupervisor::new(store("fail"));
    let (tx, mut rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::oneshot("fail", "exit 7").build();
    let mut handle = supervisor.spawn(&spec, tx)?;

    assert_eq!(with_timeout(handle.wait()).await, Some(ExitInfo::Code(7)));
    assert!(!handle.is_running());
    assert_eq!(next_exit(&mut rx).await.1, ExitInfo::Code(7));
    assert!(!supervisor.is_running("fail"));
    Ok(())
}

#[tokio::test]
async fn missing_workdir_is_a_spawn_error() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    let missing = dir.path().join("does-not-exist");
    let supervisor = ProcessSupervisor::new(store("lost"));
    let (tx, _rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::oneshot("lost", "true").workdir(&missing).build();
    match supervisor.spawn(&spec, tx) {
        Err(OrchestrateError::Spawn { task, message }) => {
            assert_eq!(task, "lost");
            assert!(message.contains("does-not-exist"), "{message}");
        }
        other => panic!("expected Spawn error, got {other:?}"),
    }
    assert!(supervisor.pid("lost").is_none());
    Ok(())
}

#[tokio::test]
async fn commands_run_in_their_workdir() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("marker.txt"), "found it\n")?;

    let logs = store("cat");
    let supervisor = ProcessSupervisor::new(logs.clone());
    let (tx, mut rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::oneshot("cat", "cat marker.txt").workdir(dir.path()).build();
    supervisor.spawn(&spec, tx)?;

    assert_eq!(next_exit(&mut rx).await.1, ExitInfo::Code(0));
    assert_eq!(logs.snapshot("cat")?[0].text, "found it");
    Ok(())
}

#[tokio::test]
async fn stdin_lines_reach_the_process() -> TestResult {
    init_tracing();

    let logs = store("echo");
    let supervisor = ProcessSupervisor::new(logs.clone());
    let (tx, mut rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::oneshot("echo", "read line; echo \"got $line\"").build();
    supervisor.spawn(&spec, tx)?;
    supervisor.write_stdin("echo", "ping").await?;

    assert_eq!(next_exit(&mut rx).await.1, ExitInfo::Code(0));
    assert_eq!(logs.snapshot("echo")?[0].text, "got ping");

    assert!(matches!(
        supervisor.write_stdin("echo", "again").await,
        Err(OrchestrateError::ProcessNotRunning(_))
    ));
    Ok(())
}

#[tokio::test]
async fn terminate_sends_sigterm_to_the_process_group() -> TestResult {
    init_tracing();

    let supervisor = ProcessSupervisor::new(store("sleepy"));
    let (tx, mut rx) = mpsc::channel(8);

    // Child of the shell must be reached too.
    let spec = TaskSpecBuilder::daemon("sleepy", "sleep 30; echo unreachable").build();
    supervisor.spawn(&spec, tx)?;
    assert!(supervisor.is_running("sleepy"));

    let started = Instant::now();
    with_timeout(supervisor.terminate("sleepy", Duration::from_secs(5))).await?;
    assert!(started.elapsed() < Duration::from_secs(4));

    let (_, exit) = next_exit(&mut rx).await;
    assert_ne!(exit, ExitInfo::Code(0));
    assert!(!supervisor.is_running("sleepy"));

    // Second call is a no-op.
    supervisor.terminate("sleepy", Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test]
async fn terminate_escalates_to_sigkill_after_grace() -> TestResult {
    init_tracing();

    let supervisor = ProcessSupervisor::new(store("stubborn"));
    let (tx, mut rx) = mpsc::channel(8);

    let spec = TaskSpecBuilder::daemon("stubborn", "trap '' TERM; sleep 30").build();
    supervisor.spawn(&spec, tx)?;
    // Give the shell time to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    with_timeout(supervisor.terminate("stubborn", Duration::from_millis(300))).await?;
    assert!(started.elapsed() >= Duration::from_millis(300));

    let (_, exit) = next_exit(&mut rx).await;
    assert_eq!(exit, ExitInfo::Signal(9));
    Ok(())
}

#[tokio::test]
async fn probe_succeeds_once_the_condition_holds() -> TestResult {
    init_tracing();

    let dir = TempDir::new()?;
    let flag = dir.path().join("ready.flag");
    let writer = {
        let flag = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::fs::write(flag, "").unwrap();
        })
    };

    let outcome = probe_until_ready(
        "test -f ready.flag",
        dir.path(),
        Duration::from_secs(5),
        Duration::from_millis(50),
    )
    .await;
    writer.await?;

    match outcome {
        ProbeOutcome::Ready { attempts, elapsed } => {
            assert!(attempts > 1);
            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_secs(5));
        }
        other => panic!("expected Ready, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn probe_times_out_no_earlier_than_the_deadline() -> TestResult {
    init_tracing();

    let timeout = Duration::from_millis(600);
    let interval = Duration::from_millis(100);
    let started = Instant::now();

    let outcome = probe_until_ready("false", &std::env::current_dir()?, timeout, interval).await;
    let elapsed = started.elapsed();

    assert!(matches!(outcome, ProbeOutcome::Timeout { .. }), "{outcome:?}");
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + interval + Duration::from_millis(400));
    Ok(())
}

#[tokio::test]
async fn hanging_probe_attempt_is_cut_off_at_the_deadline() -> TestResult {
    init_tracing();

    let started = Instant::now();
    let outcome = probe_until_ready(
        "sleep 10",
        &std::env::current_dir()?,
        Duration::from_millis(300),
        Duration::from_millis(100),
    )
    .await;

    assert!(matches!(outcome, ProbeOutcome::Timeout { attempts: 1, .. }), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn cancelled_probe_reports_nothing() -> TestResult {
    init_tracing();

    let prober = ReadinessProber::new(Duration::from_millis(20));
    let (tx, mut rx) = mpsc::channel(8);

    prober.start(
        "web",
        "false".to_string(),
        std::env::current_dir()?,
        Duration::from_millis(200),
        tx,
        None,
    );
    assert!(prober.is_probing("web"));
    assert!(prober.cancel("web"));
    assert!(!prober.cancel("web"));

    let received = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    // Either nothing arrives or the channel closes once the loop ends.
    assert!(matches!(received, Err(_) | Ok(None)));
    Ok(())
}

#[tokio::test]
async fn prober_reports_its_outcome() -> TestResult {
    init_tracing();

    let prober = ReadinessProber::new(Duration::from_millis(20));
    let (tx, mut rx) = mpsc::channel(8);

    prober.start(
        "web",
        "true".to_string(),
        std::env::current_dir()?,
        Duration::from_secs(2),
        tx,
        None,
    );

    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::ProbeFinished { task, outcome }) => {
            assert_eq!(task, "web");
            assert!(outcome.is_ready());
        }
        other => panic!("expected ProbeFinished, got {other:?}"),
    }
    assert!(!prober.is_probing("web"));
    Ok(())
}

#[tokio::test]
async fn readiness_polling_stops_when_the_service_process_exits() -> TestResult {
    init_tracing();

    let supervisor = ProcessSupervisor::new(store("web"));
    let prober = ReadinessProber::new(Duration::from_millis(20));
    let (tx, mut rx) = mpsc::channel(8);

    // The background sleep keeps the pipes open after the shell has exited.
    let spec = TaskSpecBuilder::service("web", "sleep 2 & exit 0").build();
    supervisor.spawn(&spec, tx.clone())?;
    let exit_watch = supervisor.exit_watch("web");
    assert!(exit_watch.is_some());

    prober.start(
        "web",
        "sleep 0.3; true".to_string(),
        std::env::current_dir()?,
        Duration::from_secs(5),
        tx,
        exit_watch,
    );

    // Only the exit comes back; the probe never reports Ready.
    match with_timeout(rx.recv()).await {
        Some(RuntimeEvent::TaskExited { task, exit }) => {
            assert_eq!(task, "web");
            assert_eq!(exit, ExitInfo::Code(0));
        }
        other => panic!("expected TaskExited, got {other:?}"),
    }
    let later = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
    assert!(!matches!(later, Ok(Some(RuntimeEvent::ProbeFinished { .. }))), "{later:?}");
    assert!(!prober.is_probing("web"));
    Ok(())
}

#[tokio::test]
async fn kill_all_reaches_every_live_process_group() -> TestResult {
    init_tracing();

    let logs = LogStore::new([("a".to_string(), 10), ("b".to_string(), 10)]);
    let supervisor = ProcessSupervisor::new(logs);
    let (tx, mut rx) = mpsc::channel(8);

    supervisor.spawn(&TaskSpecBuilder::daemon("a", "sleep 30").build(), tx.clone())?;
    supervisor.spawn(&TaskSpecBuilder::daemon("b", "trap '' TERM; sleep 30").build(), tx)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(supervisor.kill_all(), 2);

    let mut exits = vec![next_exit(&mut rx).await, next_exit(&mut rx).await];
    exits.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(
        exits,
        vec![
            ("a".to_string(), ExitInfo::Signal(9)),
            ("b".to_string(), ExitInfo::Signal(9)),
        ]
    );
    assert_eq!(supervisor.kill_all(), 0);
    Ok(())
}
