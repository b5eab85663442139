// src/logs/subscription.rs

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Live, per-subscriber view of a broadcast stream.
///
/// Each subscriber has its own bounded backlog. When it falls behind, the
/// oldest items it has not yet received are discarded (and counted in
/// [`dropped`](Self::dropped)); the producer and the other subscribers are
/// unaffected.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    dropped: u64,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx, dropped: 0 }
    }

    /// Wait for the next item. Returns `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(item) => return Some(item),
                Err(RecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Number of items this subscriber missed because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
