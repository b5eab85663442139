// src/logs/store.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use crate::dag::DependencyGraph;
use crate::engine::TaskName;
use crate::errors::{OrchestrateError, Result};
use crate::logs::buffer::{LogBuffer, LogLine, TaggedLogLine};
use crate::logs::subscription::Subscription;

/// Backlog each subscriber may accumulate before its oldest items are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Per-task ring buffers plus live fan-out.
///
/// Cheap to clone; all clones share the same buffers. The set of tasks is
/// fixed at construction. Appends for one task are serialized by that task's
/// lock, so concurrent stdout/stderr readers interleave line by line and
/// every subscriber sees the same order as the buffer.
#[derive(Debug, Clone)]
pub struct LogStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    tasks: HashMap<TaskName, TaskLog>,
    all_tx: broadcast::Sender<TaggedLogLine>,
    next_seq: AtomicU64,
    subscriber_capacity: usize,
}

#[derive(Debug)]
struct TaskLog {
    buffer: Mutex<LogBuffer>,
    tx: broadcast::Sender<LogLine>,
}

impl LogStore {
    /// Create a store for the given `(task, max_lines)` pairs.
    pub fn new(tasks: impl IntoIterator<Item = (TaskName, usize)>) -> Self {
        Self::with_subscriber_capacity(tasks, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_subscriber_capacity(
        tasks: impl IntoIterator<Item = (TaskName, usize)>,
        subscriber_capacity: usize,
    ) -> Self {
        let subscriber_capacity = subscriber_capacity.max(1);
        let tasks = tasks
            .into_iter()
            .map(|(name, max_lines)| {
                let (tx, _) = broadcast::channel(subscriber_capacity);
                let log = TaskLog {
                    buffer: Mutex::new(LogBuffer::new(max_lines)),
                    tx,
                };
                (name, log)
            })
            .collect();
        let (all_tx, _) = broadcast::channel(subscriber_capacity);

        Self {
            inner: Arc::new(StoreInner {
                tasks,
                all_tx,
                next_seq: AtomicU64::new(1),
                subscriber_capacity,
            }),
        }
    }

    /// One buffer per task in the graph, sized by each task's `max_lines`.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        Self::new(graph.specs().map(|s| (s.name.clone(), s.max_lines)))
    }

    /// Append a line to a task's buffer and publish it to subscribers.
    ///
    /// Never waits on subscribers. If the buffer is full the oldest line is
    /// evicted first.
    pub fn append(&self, task: &str, mut line: LogLine) -> Result<()> {
        let log = self.task_log(task)?;
        let mut buffer = lock(&log.buffer);

        line.seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        if buffer.push(line.clone()).is_some() {
            trace!(task = %task, capacity = buffer.capacity(), "log buffer full; evicted oldest line");
        }

        // Send errors only mean there is currently no subscriber.
        let _ = log.tx.send(line.clone());
        let _ = self.inner.all_tx.send(TaggedLogLine {
            task: task.to_string(),
            line,
        });

        Ok(())
    }

    /// Buffered lines for a task, oldest first.
    pub fn snapshot(&self, task: &str) -> Result<Vec<LogLine>> {
        let log = self.task_log(task)?;
        Ok(lock(&log.buffer).snapshot())
    }

    /// Live lines for a task from now on.
    pub fn subscribe(&self, task: &str) -> Result<Subscription<LogLine>> {
        let log = self.task_log(task)?;
        Ok(Subscription::new(log.tx.subscribe()))
    }

    /// Snapshot plus live subscription taken under the same lock, so every
    /// line shows up exactly once across the two.
    pub fn snapshot_and_subscribe(&self, task: &str) -> Result<(Vec<LogLine>, Subscription<LogLine>)> {
        let log = self.task_log(task)?;
        let buffer = lock(&log.buffer);
        let rx = log.tx.subscribe();
        Ok((buffer.snapshot(), Subscription::new(rx)))
    }

    /// Live lines from every task.
    pub fn subscribe_all(&self) -> Subscription<TaggedLogLine> {
        Subscription::new(self.inner.all_tx.subscribe())
    }

    /// Buffered lines from every task, merged in arrival order.
    pub fn snapshot_all(&self) -> Vec<TaggedLogLine> {
        let mut all: Vec<TaggedLogLine> = self
            .inner
            .tasks
            .iter()
            .flat_map(|(name, log)| {
                lock(&log.buffer)
                    .snapshot()
                    .into_iter()
                    .map(|line| TaggedLogLine {
                        task: name.clone(),
                        line,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by_key(|tagged| tagged.line.seq);
        all
    }

    /// Number of buffered lines for a task.
    pub fn len(&self, task: &str) -> Result<usize> {
        let log = self.task_log(task)?;
        Ok(lock(&log.buffer).len())
    }

    pub fn subscriber_capacity(&self) -> usize {
        self.inner.subscriber_capacity
    }

    pub fn contains(&self, task: &str) -> bool {
        self.inner.tasks.contains_key(task)
    }

    fn task_log(&self, task: &str) -> Result<&TaskLog> {
        self.inner
            .tasks
            .get(task)
            .ok_or_else(|| OrchestrateError::TaskNotFound(task.to_string()))
    }
}

/// A poisoned buffer still holds valid lines; keep using it.
fn lock(buffer: &Mutex<LogBuffer>) -> MutexGuard<'_, LogBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}
