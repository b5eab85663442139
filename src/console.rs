// src/console.rs

//! Plain terminal front-end.
//!
//! Prints every captured line (status transitions arrive as `System` lines)
//! prefixed with its task name, forwards `task: text` lines typed on the
//! terminal to that task's stdin, and prints a summary table at the end.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{SchedulerHandle, StatusSnapshot};
use crate::logs::TaggedLogLine;
use crate::types::{StreamTag, format_duration};

/// Width of the task-name column: the longest name, at least 4.
pub fn name_width<'a>(names: impl IntoIterator<Item = &'a str>) -> usize {
    names.into_iter().map(str::len).max().unwrap_or(0).max(4)
}

/// `[web  ] | Serving HTTP on 0.0.0.0 port 9781`
pub fn format_log_line(tagged: &TaggedLogLine, width: usize) -> String {
    let sep = match tagged.line.stream {
        StreamTag::Stdout => "|",
        StreamTag::Stderr => "!",
        StreamTag::System => "=",
    };
    format!(
        "{} [{:<width$}] {} {}",
        tagged.line.timestamp.format("%H:%M:%S"),
        tagged.task,
        sep,
        tagged.line.text,
        width = width
    )
}

/// Split `task: text` into its parts. The text keeps everything after the
/// first colon, minus one leading space.
pub fn parse_stdin_command(input: &str) -> Option<(&str, &str)> {
    let (task, text) = input.split_once(':')?;
    let task = task.trim();
    if task.is_empty() {
        return None;
    }
    Some((task, text.strip_prefix(' ').unwrap_or(text)))
}

/// One row per task: symbol, name, status, run time, and reason if any.
pub fn format_summary(snapshot: &StatusSnapshot) -> String {
    let width = name_width(snapshot.keys().map(String::as_str));
    let mut out = String::new();
    for task in snapshot.values() {
        let duration = task
            .duration()
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{} {:<width$}  {:<9}  {:>7}",
            task.status.symbol(),
            task.name,
            task.status.to_string(),
            duration,
            width = width
        ));
        if let Some(reason) = &task.last_error {
            out.push_str("  ");
            out.push_str(reason);
        }
        out.push('\n');
    }
    out
}

/// Print all log lines as they arrive. Ends when the log store goes away.
pub fn spawn_printer(handle: &SchedulerHandle, width: usize) -> JoinHandle<()> {
    let mut lines = handle.subscribe_all_logs();
    tokio::spawn(async move {
        while let Some(tagged) = lines.recv().await {
            println!("{}", format_log_line(&tagged, width));
        }
        if lines.dropped() > 0 {
            debug!(dropped = lines.dropped(), "console fell behind and skipped lines");
        }
    })
}

/// Forward terminal input to task stdin. Ends on EOF.
pub fn spawn_stdin_forwarder(handle: SchedulerHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "terminal input closed");
                    break;
                }
            };
            let Some((task, text)) = parse_stdin_command(&line) else {
                eprintln!("input must look like `task: text`");
                continue;
            };
            if let Err(e) = handle.send_stdin(task, text).await {
                warn!(task = %task, error = %e, "could not forward input");
                eprintln!("{e}");
            }
        }
    })
}
