// src/logs/buffer.rs

use std::collections::VecDeque;

use chrono::{DateTime, Local};

use crate::engine::TaskName;
use crate::types::StreamTag;

/// One captured line of output (or one scheduler lifecycle note).
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// Store-wide arrival order; assigned by [`LogStore::append`](super::LogStore::append).
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub stream: StreamTag,
    pub text: String,
}

impl LogLine {
    /// A line stamped with the current local time.
    pub fn new(stream: StreamTag, text: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: Local::now(),
            stream,
            text: text.into(),
        }
    }
}

/// A [`LogLine`] together with the task that produced it, as delivered on
/// the all-tasks stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedLogLine {
    pub task: TaskName,
    pub line: LogLine,
}

/// Fixed-capacity FIFO ring of log lines.
///
/// When full, pushing evicts the oldest line first. Iteration order is
/// insertion order.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
}

impl LogBuffer {
    /// A `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append a line, returning the evicted line if the buffer was full.
    pub fn push(&mut self, line: LogLine) -> Option<LogLine> {
        let evicted = if self.lines.len() >= self.capacity {
            self.lines.pop_front()
        } else {
            None
        };
        self.lines.push_back(line);
        evicted
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Owned copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }
}
