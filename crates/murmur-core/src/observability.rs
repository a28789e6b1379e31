use serde::{Deserialize, Serialize};

use crate::queue::QueueType;

/// Snapshot of queue sizes, as returned by `query_queue_state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub current: usize,
    pub retry: usize,
    pub skipped: usize,
    pub error: usize,
    pub done: usize,
    /// 1 while a command is mid-execution.
    pub executing: usize,
}

impl QueueCounts {
    pub fn get(&self, queue: QueueType) -> usize {
        match queue {
            QueueType::Current => self.current,
            QueueType::Retry => self.retry,
            QueueType::Skipped => self.skipped,
            QueueType::Error => self.error,
            QueueType::Done => self.done,
        }
    }

    pub(crate) fn set(&mut self, queue: QueueType, size: usize) {
        let slot = match queue {
            QueueType::Current => &mut self.current,
            QueueType::Retry => &mut self.retry,
            QueueType::Skipped => &mut self.skipped,
            QueueType::Error => &mut self.error,
            QueueType::Done => &mut self.done,
        };
        *slot = size;
    }

    /// Commands that still want to run (pending or executing).
    pub fn pending(&self) -> usize {
        self.current + self.retry + self.executing
    }
}
